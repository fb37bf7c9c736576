use crate::bson::{Bson, Document};

pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "mongodb::command";
pub(crate) const SESSION_TRACING_EVENT_TARGET: &str = "mongodb::session";
pub(crate) const BULK_TRACING_EVENT_TARGET: &str = "mongodb::bulk";

/// Documents rendered into tracing events are cut off after this many bytes.
pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        let mut json = Bson::Document(self.clone())
            .into_relaxed_extjson()
            .to_string();
        truncate_on_char_boundary(&mut json, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES);
        json
    }
}

impl TracingRepresentation for crate::error::Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

/// Truncates `s` to at most `max_length` bytes, backing off to the previous character boundary
/// and appending "..." when anything was removed.
pub(crate) fn truncate_on_char_boundary(s: &mut String, max_length: usize) {
    if s.len() <= max_length {
        return;
    }
    let mut boundary = max_length;
    while !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    s.truncate(boundary);
    s.push_str("...");
}

#[cfg(test)]
mod test {
    use crate::bson::doc;

    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut s = "héllo".to_string();
        truncate_on_char_boundary(&mut s, 2);
        assert_eq!(s, "h...");

        let mut s = "short".to_string();
        truncate_on_char_boundary(&mut s, 10);
        assert_eq!(s, "short");
    }

    #[test]
    fn long_documents_are_truncated() {
        let doc = doc! { "x": "a".repeat(5000) };
        let repr = doc.tracing_representation();
        assert_eq!(repr.len(), DEFAULT_MAX_DOCUMENT_LENGTH_BYTES + 3);
        assert!(repr.starts_with(r#"{"x":"aaa"#));
    }
}
