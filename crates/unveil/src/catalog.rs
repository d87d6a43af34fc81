//! Record catalog - the selectable records of an unlocked profile

use crate::filter::single_line;
use crate::vault::Record;

/// Records in vault order, addressed by title
#[derive(Debug, Default)]
pub struct RecordCatalog {
    records: Vec<Record>,
}

impl RecordCatalog {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Titles in iteration order, one per record
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.title.as_str())
    }

    /// First record with exactly this title, as the filter showed it
    pub fn find(&self, title: &str) -> Option<&Record> {
        self.records.iter().find(|r| single_line(&r.title) == title)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{Detail, Field};

    fn record(title: &str, category: &str) -> Record {
        Record::new(title, category, &[], Detail::default())
    }

    #[test]
    fn test_titles_keep_order() {
        let catalog = RecordCatalog::new(vec![record("b", "x"), record("a", "x"), record("c", "x")]);
        let titles: Vec<&str> = catalog.titles().collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_find_first_match_wins() {
        let catalog = RecordCatalog::new(vec![
            record("Gmail", "first"),
            record("Bank", "x"),
            Record::new(
                "Gmail",
                "second",
                &[],
                Detail {
                    fields: vec![Field::top_level("a", "text", "b")],
                    sections: vec![],
                },
            ),
        ]);

        assert_eq!(catalog.find("Gmail").unwrap().category, "first");
        assert!(catalog.find("gmail").is_none());
        assert!(catalog.find("").is_none());
    }

    #[test]
    fn test_find_multiline_title() {
        let catalog = RecordCatalog::new(vec![record("Home\nRouter", "wifi")]);
        assert_eq!(catalog.find("Home Router").unwrap().category, "wifi");
        assert!(catalog.find("Home").is_none());
    }

    #[test]
    fn test_empty() {
        let catalog = RecordCatalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.titles().count(), 0);
    }
}
