use crate::line_record::LineRecord;

/// Owned form of a parsed sort key, used to index the merge frontier.
///
/// Field order matters: the derived `Ord` compares the text part first
/// (byte order) and the numeric prefix second, same as [LineRecord].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LineKey {
    text: String,
    number: i64,
}

impl From<&LineRecord> for LineKey {
    fn from(record: &LineRecord) -> LineKey {
        LineKey {
            text: record.text().to_string(),
            number: record.number(),
        }
    }
}
