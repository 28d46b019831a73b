use crate::types::{JoinedRecord, PeriodRecord, Region};
use std::collections::HashMap;
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strips diacritics (canonical decomposition, combining marks dropped) and
/// surrounding whitespace. Case is preserved.
pub fn normalize(s: &str) -> String {
    let stripped: String = s.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped.trim().to_string()
}

/// Key used to join metric rows onto regions: normalized and case-folded.
pub fn match_key(s: &str) -> String {
    normalize(&s.to_lowercase())
}

pub fn match_region<'a>(raw_name: &str, regions: &'a [Region]) -> Option<&'a Region> {
    let key = match_key(raw_name);
    regions.iter().find(|r| match_key(&r.id) == key)
}

/// Lookup from join key to region index. The first region wins on duplicate keys.
pub struct RegionIndex {
    by_key: HashMap<String, usize>,
}

impl RegionIndex {
    pub fn new(regions: &[Region]) -> Self {
        let mut by_key: HashMap<String, usize> = HashMap::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            let key = match_key(&region.id);
            if let Some(&first) = by_key.get(&key) {
                warn!(
                    "Region '{}' collides with '{}' after normalization; keeping the first",
                    region.id, regions[first].id
                );
                continue;
            }
            by_key.insert(key, i);
        }
        Self { by_key }
    }

    pub fn lookup(&self, raw_name: &str) -> Option<usize> {
        self.by_key.get(&match_key(raw_name)).copied()
    }
}

/// Joins every metric row with its region. Rows are kept in input order and
/// unmatched rows survive with their trimmed raw name.
pub fn join(regions: &[Region], records: Vec<PeriodRecord>) -> Vec<JoinedRecord> {
    let index = RegionIndex::new(regions);
    records
        .into_iter()
        .map(|record| match index.lookup(&record.raw_name) {
            Some(i) => JoinedRecord {
                name: regions[i].id.clone(),
                region: Some(i),
                record,
            },
            None => {
                debug!("No region matches '{}'; keeping it table-only", record.raw_name);
                JoinedRecord {
                    name: record.raw_name.trim().to_string(),
                    region: None,
                    record,
                }
            }
        })
        .collect()
}
