use geo::MultiPolygon;

#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodValue {
    pub label: String,
    pub value: f64, // NaN when the source cell was not a number
}

/// One metric row, before it is matched against the region list.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRecord {
    pub raw_name: String,
    pub values: Vec<PeriodValue>,
}

impl PeriodRecord {
    /// Sum of all period values. A single NaN poisons the total.
    pub fn total(&self) -> f64 {
        self.values.iter().map(|v| v.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    /// Canonical region name when matched, the trimmed raw name otherwise.
    pub name: String,
    /// Index into `Dataset::regions`; `None` keeps the record table-only.
    pub region: Option<usize>,
    pub record: PeriodRecord,
}

impl JoinedRecord {
    pub fn is_positioned(&self) -> bool {
        self.region.is_some()
    }

    pub fn total(&self) -> f64 {
        self.record.total()
    }

    pub fn values(&self) -> &[PeriodValue] {
        &self.record.values
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub regions: Vec<Region>,
    pub records: Vec<JoinedRecord>,
    pub periods: Vec<String>,
}

impl Dataset {
    /// Largest finite total, ignoring NaN rows.
    pub fn max_total(&self) -> Option<f64> {
        self.records
            .iter()
            .map(JoinedRecord::total)
            .filter(|t| t.is_finite())
            .fold(None, |acc, t| Some(acc.map_or(t, |m: f64| m.max(t))))
    }

    /// Largest finite single-period value across all records.
    pub fn max_value(&self) -> Option<f64> {
        self.records
            .iter()
            .flat_map(|r| r.values().iter().map(|v| v.value))
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }
}
