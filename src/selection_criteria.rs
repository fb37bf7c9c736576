use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    bson::{self, Document},
    error::{Error, Result},
};

/// Specifies how the targeted deployment should route a read.
///
/// See the documentation [here](https://www.mongodb.com/docs/manual/core/read-preference/) for more details.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReadPreference {
    /// Which kind of replica set member may serve the read.
    pub mode: ReadPreferenceMode,

    /// Restricts eligible members to those matching one of these tag sets.
    pub tags: Option<Vec<Document>>,

    /// The maximum replication lag, in seconds, of an eligible secondary.
    pub max_staleness_seconds: Option<i64>,
}

/// The mode of a [`ReadPreference`].
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum ReadPreferenceMode {
    /// Only route to the primary.
    #[display("primary")]
    Primary,

    /// Route to the primary when available, otherwise to a secondary.
    #[display("primaryPreferred")]
    PrimaryPreferred,

    /// Only route to secondaries.
    #[display("secondary")]
    Secondary,

    /// Route to a secondary when available, otherwise to the primary.
    #[display("secondaryPreferred")]
    SecondaryPreferred,

    /// Route to the member with the lowest latency.
    #[display("nearest")]
    Nearest,
}

impl From<ReadPreferenceMode> for ReadPreference {
    fn from(mode: ReadPreferenceMode) -> Self {
        Self {
            mode,
            tags: None,
            max_staleness_seconds: None,
        }
    }
}

impl ReadPreference {
    pub fn primary() -> Self {
        ReadPreferenceMode::Primary.into()
    }

    pub fn primary_preferred() -> Self {
        ReadPreferenceMode::PrimaryPreferred.into()
    }

    pub fn secondary() -> Self {
        ReadPreferenceMode::Secondary.into()
    }

    pub fn secondary_preferred() -> Self {
        ReadPreferenceMode::SecondaryPreferred.into()
    }

    pub fn nearest() -> Self {
        ReadPreferenceMode::Nearest.into()
    }

    /// Parses a `$readPreference` document as found in a wrapped command.
    pub(crate) fn from_document(doc: Document) -> Result<Self> {
        bson::from_document(doc).map_err(|e| {
            Error::invalid_argument(format!("invalid $readPreference document: {e}"))
        })
    }

    /// Serializes this read preference into the shape of a `$readPreference` document.
    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::bson::doc;

    use super::*;

    #[test]
    fn parse_read_preference_document() {
        let parsed = ReadPreference::from_document(doc! {
            "mode": "secondaryPreferred",
            "maxStalenessSeconds": 120_i64,
        })
        .unwrap();
        assert_eq!(parsed.mode, ReadPreferenceMode::SecondaryPreferred);
        assert_eq!(parsed.max_staleness_seconds, Some(120));

        assert!(ReadPreference::from_document(doc! { "mode": "fastest" }).is_err());
    }

    #[test]
    fn serialize_skips_unset_fields() {
        assert_eq!(
            ReadPreference::nearest().to_document().unwrap(),
            doc! { "mode": "nearest" }
        );
        assert_eq!(ReadPreferenceMode::PrimaryPreferred.to_string(), "primaryPreferred");
    }
}
