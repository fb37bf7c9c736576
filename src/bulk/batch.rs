use crate::{
    bson::{doc, oid::ObjectId, Bson, Document},
    bulk::{WriteKind, WriteModel},
    coll::Collection,
    command::Command,
    concern::WriteConcern,
    error::Result,
};

/// Extra bytes accounted for an insert whose document has no `_id` yet: the element header,
/// the key and a 12-byte `ObjectId`.
pub(crate) const GENERATED_ID_SIZE_BYTES: usize = 17;

/// A maximal run of same-kind write models that fits in one command. `original_offset` is the
/// index of the batch's first model within the whole bulk write.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    kind: WriteKind,
    original_offset: usize,
    operations: Vec<WriteModel>,
    size_bytes: usize,
}

impl Batch {
    fn new(kind: WriteKind, original_offset: usize) -> Self {
        Self {
            kind,
            original_offset,
            operations: Vec::new(),
            size_bytes: 0,
        }
    }

    /// The kind shared by every operation of this batch.
    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    /// Index of this batch's first operation in the bulk write.
    pub fn original_offset(&self) -> usize {
        self.original_offset
    }

    pub fn operations(&self) -> &[WriteModel] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The estimated encoded size of the operations.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Builds the write command for this batch. Inserted documents without an `_id` get a
    /// generated one here, so every send of the returned command carries the same ids.
    ///
    /// Returns the command together with the wire elements it carries, in order.
    pub(crate) fn build_command(
        &self,
        collection: &Collection,
        ordered: bool,
        write_concern: Option<&WriteConcern>,
    ) -> Result<(Command, Vec<Document>)> {
        let elements: Vec<Document> = self
            .operations
            .iter()
            .map(|model| match model {
                WriteModel::Insert { document } if !document.contains_key("_id") => {
                    let mut with_id = doc! { "_id": ObjectId::new() };
                    with_id.extend(document.clone());
                    with_id
                }
                model => model.to_wire_element(),
            })
            .collect();

        let name = self.kind.command_name();
        let mut body = Document::new();
        body.insert(name, collection.name());
        body.insert(
            self.kind.operations_field(),
            elements.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
        );
        body.insert("ordered", ordered);

        let mut command = Command::new(name, collection.database().name(), body);
        if let Some(write_concern) = write_concern {
            command.set_write_concern(write_concern)?;
        }
        Ok((command, elements))
    }
}

/// Partitions `models` into batches in a single pass. A batch is sealed when the next model has
/// a different kind, or when adding it would exceed `max_count` operations or reach `max_bytes`.
/// A model that alone reaches `max_bytes` still gets a batch of its own.
pub(crate) fn build_batches(
    models: &[WriteModel],
    max_count: usize,
    max_bytes: usize,
) -> Result<Vec<Batch>> {
    let mut batches = Vec::new();
    let mut current: Option<Batch> = None;

    for (offset, model) in models.iter().enumerate() {
        let size = model.estimated_size()?;
        let kind = model.kind();

        let seal = match current {
            Some(ref batch) => {
                batch.kind != kind
                    || batch.len() + 1 > max_count
                    || batch.size_bytes + size >= max_bytes
            }
            None => false,
        };
        if seal {
            batches.extend(current.take());
        }

        let batch = current.get_or_insert_with(|| Batch::new(kind, offset));
        batch.operations.push(model.clone());
        batch.size_bytes += size;
    }
    batches.extend(current);

    Ok(batches)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bson_util;

    fn insert(i: i32) -> WriteModel {
        WriteModel::Insert {
            document: doc! { "_id": i },
        }
    }

    fn delete(i: i32) -> WriteModel {
        WriteModel::Delete {
            filter: doc! { "_id": i },
            limit: 1,
            collation: None,
            hint: None,
        }
    }

    fn shape(batches: &[Batch]) -> Vec<(WriteKind, usize, usize)> {
        batches
            .iter()
            .map(|b| (b.kind(), b.original_offset(), b.len()))
            .collect()
    }

    #[test]
    fn empty_input_produces_no_batches() {
        assert!(build_batches(&[], 10, 1000).unwrap().is_empty());
    }

    #[test]
    fn kind_changes_seal_batches() {
        let models = vec![insert(0), insert(1), delete(0), insert(2)];
        let batches = build_batches(&models, 1000, 16 * 1024 * 1024).unwrap();
        assert_eq!(
            shape(&batches),
            vec![
                (WriteKind::Insert, 0, 2),
                (WriteKind::Delete, 2, 1),
                (WriteKind::Insert, 3, 1),
            ]
        );
    }

    #[test]
    fn count_cap_seals_batches() {
        let models: Vec<_> = (0..1500).map(insert).collect();
        let batches = build_batches(&models, 1000, 16 * 1024 * 1024).unwrap();
        assert_eq!(
            shape(&batches),
            vec![(WriteKind::Insert, 0, 1000), (WriteKind::Insert, 1000, 500)]
        );
        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, models.len());
    }

    #[test]
    fn size_cap_seals_batches() {
        let models: Vec<_> = (0..10).map(insert).collect();
        let size = models[0].estimated_size().unwrap();
        // Room for three models: the fourth would reach the cap.
        let batches = build_batches(&models, 1000, size * 4).unwrap();
        assert_eq!(
            batches.iter().map(Batch::len).collect::<Vec<_>>(),
            vec![3, 3, 3, 1]
        );
        for batch in &batches {
            assert!(batch.size_bytes() < size * 4);
        }
    }

    #[test]
    fn oversized_model_gets_its_own_batch() {
        let big = WriteModel::Insert {
            document: doc! { "_id": 1, "payload": "x".repeat(200) },
        };
        let models = vec![insert(0), big, insert(2)];
        let batches = build_batches(&models, 1000, 100).unwrap();
        assert_eq!(
            shape(&batches),
            vec![
                (WriteKind::Insert, 0, 1),
                (WriteKind::Insert, 1, 1),
                (WriteKind::Insert, 2, 1),
            ]
        );
    }

    #[test]
    fn inserts_without_id_account_for_generated_id() {
        let with_id = WriteModel::Insert {
            document: doc! { "_id": 1, "x": 1 },
        };
        let without_id = WriteModel::Insert {
            document: doc! { "x": 1 },
        };
        assert_eq!(
            without_id.estimated_size().unwrap(),
            bson_util::doc_size_bytes(&doc! { "x": 1 }).unwrap() + GENERATED_ID_SIZE_BYTES
        );
        assert_eq!(
            with_id.estimated_size().unwrap(),
            bson_util::doc_size_bytes(&doc! { "_id": 1, "x": 1 }).unwrap()
        );
    }
}
