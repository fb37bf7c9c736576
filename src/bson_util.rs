use crate::{
    bson::{Bson, Document},
    error::{ErrorKind, Result},
};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Reads a numeric field from `doc`, returning `None` when it is missing or not an integer.
pub(crate) fn get_int_field(doc: &Document, key: &str) -> Option<i64> {
    doc.get(key).and_then(get_int)
}

pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

pub(crate) fn replacement_document_check(replacement: &Document) -> Result<()> {
    match first_key(replacement) {
        Some(s) if s.starts_with('$') => Err(ErrorKind::InvalidArgument {
            message: "replace document must have first key not starting with '$'".to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

pub(crate) fn update_document_check(update: &Document) -> Result<()> {
    match first_key(update) {
        Some(s) if s.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "update document must have first key starting with '$'".to_string(),
        }
        .into()),
    }
}

/// The encoded BSON length of `doc`.
pub(crate) fn doc_size_bytes(doc: &Document) -> Result<usize> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes)?;
    Ok(bytes.len())
}

#[cfg(test)]
mod test {
    use crate::bson::doc;

    use super::*;

    #[test]
    fn get_int_is_lossless() {
        assert_eq!(get_int(&Bson::Int32(3)), Some(3));
        assert_eq!(get_int(&Bson::Double(4.0)), Some(4));
        assert_eq!(get_int(&Bson::Double(4.5)), None);
        assert_eq!(get_int(&Bson::String("4".into())), None);
    }

    #[test]
    fn update_and_replacement_checks() {
        assert!(update_document_check(&doc! { "$set": { "x": 1 } }).is_ok());
        assert!(update_document_check(&doc! { "x": 1 }).is_err());
        assert!(update_document_check(&doc! {}).is_err());

        assert!(replacement_document_check(&doc! { "x": 1 }).is_ok());
        assert!(replacement_document_check(&doc! {}).is_ok());
        assert!(replacement_document_check(&doc! { "$set": { "x": 1 } }).is_err());
    }

    #[test]
    fn doc_size_matches_encoding() {
        // 4 (length) + 1 (type) + 2 ("x\0") + 4 (i32) + 1 (terminator)
        assert_eq!(doc_size_bytes(&doc! { "x": 1 }).unwrap(), 12);
        assert_eq!(doc_size_bytes(&doc! {}).unwrap(), 5);
    }
}
