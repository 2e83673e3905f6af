use crate::stats::{self, ColumnSummary};
use ahash::{HashMap, HashMapExt};
use anyhow::{anyhow, bail, Result};
use csv::{ReaderBuilder, Trim};
use log::{debug, info};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter};

/// The numeric columns every fox table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FoxColumn {
    Groupsize,
    Area,
    Avgfood,
    Weight,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FoxRecord {
    pub group: String,
    pub groupsize: i8,
    pub area: f64,
    pub avgfood: f64,
    pub weight: f64,
}

impl FoxColumn {
    pub fn name(&self) -> &str {
        self.as_ref()
    }
}

impl FoxRecord {
    pub fn value(&self, column: FoxColumn) -> f64 {
        match column {
            FoxColumn::Groupsize => self.groupsize as f64,
            FoxColumn::Area => self.area,
            FoxColumn::Avgfood => self.avgfood,
            FoxColumn::Weight => self.weight,
        }
    }
}

/// A categorical column: sorted distinct labels and one code per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorical {
    categories: Vec<String>,
    codes: Vec<u32>,
}

impl Categorical {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut categories: Vec<String> = labels.clone().into_iter().map(str::to_string).collect();
        categories.sort();
        categories.dedup();

        let mut index = HashMap::with_capacity(categories.len());
        for (code, label) in categories.iter().enumerate() {
            index.insert(label.clone(), code as u32);
        }
        let codes = labels.into_iter().map(|label| index[label]).collect();
        Self { categories, codes }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn label(&self, row: usize) -> Option<&str> {
        self.codes
            .get(row)
            .map(|&code| self.categories[code as usize].as_str())
    }
}

/// Observation table: one row per fox, plus derived numeric columns.
#[derive(Debug, Clone)]
pub struct FoxTable {
    records: Vec<FoxRecord>,
    group: Categorical,
    derived: Vec<(String, Vec<f64>)>,
}

impl FoxTable {
    pub fn new(records: Vec<FoxRecord>) -> Result<Self> {
        if records.is_empty() {
            bail!("Fox table contains no rows");
        }
        let group = Categorical::from_labels(records.iter().map(|r| r.group.as_str()));
        Ok(Self {
            records,
            group,
            derived: Vec::new(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow!("Could not open fox table: {} ({})", path.display(), e))?;
        info!("Loading fox table from: {}", path.display());
        Self::from_reader(file)
    }

    /// Reads a `;`-separated table. The first line is skipped, the second
    /// holds the column names.
    pub fn from_reader<R: Read>(inner: R) -> Result<Self> {
        let mut buffered = BufReader::new(inner);
        let mut skipped = String::new();
        if buffered.read_line(&mut skipped)? == 0 {
            bail!("Fox table is empty");
        }
        debug!("Skipped leading line: {}", skipped.trim_end());

        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(buffered);

        let mut records = Vec::new();
        for (idx, row) in reader.deserialize::<FoxRecord>().enumerate() {
            // header is line 2, first data row line 3
            let record = row.map_err(|e| anyhow!("Malformed fox record on line {}: {}", idx + 3, e))?;
            records.push(record);
        }
        let table = Self::new(records)?;
        info!(
            "Loaded {} foxes in {} groups",
            table.len(),
            table.group.n_categories()
        );
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FoxRecord] {
        &self.records
    }

    pub fn group(&self) -> &Categorical {
        &self.group
    }

    pub fn values(&self, column: FoxColumn) -> Vec<f64> {
        self.records.iter().map(|r| r.value(column)).collect()
    }

    /// Any numeric column by name, built-in or derived.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if let Some(column) = FoxColumn::iter().find(|c| c.name() == name) {
            return Some(self.values(column));
        }
        self.derived
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.clone())
    }

    /// Attaches a derived column, replacing any column of the same name.
    pub fn add_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.len() {
            bail!(
                "Column {} has {} values, table has {} rows",
                name,
                values.len(),
                self.len()
            );
        }
        if name == "group" || FoxColumn::iter().any(|c| c.name() == name) {
            bail!("Cannot overwrite source column {}", name);
        }
        match self.derived.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.derived.push((name.to_string(), values)),
        }
        debug!("Added column {}", name);
        Ok(())
    }

    pub fn derived_names(&self) -> Vec<&str> {
        self.derived.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Integer range spanned by `groupsize`.
    pub fn groupsize_range(&self) -> (i8, i8) {
        let min = self.records.iter().map(|r| r.groupsize).min().unwrap_or(0);
        let max = self.records.iter().map(|r| r.groupsize).max().unwrap_or(0);
        (min, max)
    }

    pub fn describe(&self) -> Vec<ColumnSummary> {
        let mut out: Vec<ColumnSummary> = FoxColumn::iter()
            .map(|c| stats::describe(c.name(), &self.values(c)))
            .collect();
        out.extend(
            self.derived
                .iter()
                .map(|(name, values)| stats::describe(name, values)),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    fn create_temp_file(data: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file.write_all(data).expect("Failed to write data");
        temp_file
            .seek(SeekFrom::Start(0))
            .expect("Failed to seek to start");
        temp_file
    }

    #[test]
    fn test_load_sample_table() {
        let table = FoxTable::from_path(Path::new("test_data/foxes_sample.csv"))
            .expect("Failed to load fox table");
        assert_eq!(table.len(), 12);
        assert_eq!(table.group().n_categories(), 6);
        assert_eq!(table.records()[0].groupsize, 2);
        assert!((table.records()[2].area - 2.05).abs() < 1e-12);
        assert_eq!(table.groupsize_range(), (2, 3));
        assert_eq!(table.group().label(8), Some("5"));
    }

    #[test]
    fn test_column_order_is_free_and_extra_columns_ignored() {
        let data = b"skip me\nweight;area;id;groupsize;avgfood;group\n5.0;1.5;a;4;0.3;7\n4.0;2.5;b;6;0.4;8\n";
        let tempfile = create_temp_file(data);
        let table = FoxTable::from_reader(tempfile.reopen().unwrap()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("groupsize").unwrap(), vec![4.0, 6.0]);
        assert_eq!(table.column("area").unwrap(), vec![1.5, 2.5]);
        assert_eq!(table.group().categories(), &["7".to_string(), "8".to_string()]);
    }

    #[test]
    fn test_groupsize_out_of_range_is_fatal() {
        let data = b"skip\ngroup;avgfood;groupsize;area;weight\n1;0.3;200;1.0;5.0\n";
        let tempfile = create_temp_file(data);
        let err = FoxTable::from_reader(tempfile.reopen().unwrap()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_malformed_row_is_fatal() {
        let data = b"skip\ngroup;avgfood;groupsize;area;weight\n1;0.3;2;1.0;5.0\n1;abc;2;1.0;5.0\n";
        let tempfile = create_temp_file(data);
        let err = FoxTable::from_reader(tempfile.reopen().unwrap()).unwrap_err();
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let data = b"skip\ngroup;avgfood;groupsize;area\n1;0.3;2;1.0\n";
        let tempfile = create_temp_file(data);
        assert!(FoxTable::from_reader(tempfile.reopen().unwrap()).is_err());
    }

    #[test]
    fn test_empty_inputs_are_fatal() {
        assert!(FoxTable::from_reader(&b""[..]).is_err());
        assert!(FoxTable::from_reader(&b"skip\ngroup;avgfood;groupsize;area;weight\n"[..]).is_err());
        assert!(FoxTable::from_path(Path::new("test_data/does_not_exist.csv")).is_err());
    }

    #[test]
    fn test_add_column() {
        let mut table = FoxTable::from_path(Path::new("test_data/foxes_sample.csv")).unwrap();
        let area = table.values(FoxColumn::Area);
        table.add_column("std_area", stats::standardize(&area)).unwrap();
        assert_eq!(table.derived_names(), vec!["std_area"]);
        assert!(stats::mean(&table.column("std_area").unwrap()).abs() < 1e-9);

        // replacing keeps a single column
        table.add_column("std_area", vec![0.0; 12]).unwrap();
        assert_eq!(table.derived_names().len(), 1);
        assert_eq!(table.column("std_area").unwrap(), vec![0.0; 12]);

        assert!(table.add_column("short", vec![1.0]).is_err());
        assert!(table.add_column("area", vec![0.0; 12]).is_err());
        assert!(table.column("missing").is_none());
    }

    /// 116 foxes in 30 groups, groupsize 2..=8, area loosely tracking groupsize.
    fn synthetic_foxes() -> String {
        use rand::SeedableRng;
        use rand_distr::{Distribution, StandardNormal};
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(42);
        let mut data = String::from("source line\ngroup;avgfood;groupsize;area;weight\n");
        for i in 0..116 {
            let group = i % 30 + 1;
            let groupsize = 2 + (group * 5) % 7;
            let noise: f64 = StandardNormal.sample(&mut rng);
            let area = 1.0 + 0.35 * groupsize as f64 + 0.6 * noise;
            let spread: f64 = StandardNormal.sample(&mut rng);
            let weight = 4.5 + 0.5 * spread;
            data.push_str(&format!(
                "{};{:.2};{};{:.2};{:.2}\n",
                group,
                0.2 * area,
                groupsize,
                area,
                weight
            ));
        }
        data
    }

    #[test]
    fn test_end_to_end_posterior_tracks_pearson_r() {
        let data = synthetic_foxes();
        let mut table = FoxTable::from_reader(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 116);
        assert_eq!(table.group().n_categories(), 30);
        assert_eq!(table.groupsize_range(), (2, 8));

        table.add_column("std_area", stats::standardize(&table.values(FoxColumn::Area))).unwrap();
        table
            .add_column("std_groupsize", stats::standardize(&table.values(FoxColumn::Groupsize)))
            .unwrap();
        let std_area = table.column("std_area").unwrap();
        let std_groupsize = table.column("std_groupsize").unwrap();

        let r = stats::pearson_r(&std_area, &std_groupsize);
        let trace = crate::sampler::fit_posterior(&std_area, &std_groupsize, 2000, Some(0)).unwrap();
        let posterior_mean = stats::mean(&trace.draws());
        assert!((posterior_mean - r).abs() < 0.15, "{} vs {}", posterior_mean, r);
        assert!(trace.diagnostics.is_ok(), "{:?}", trace.diagnostics.warnings());
    }

    #[test]
    fn test_describe_covers_all_numeric_columns() {
        let mut table = FoxTable::from_path(Path::new("test_data/foxes_sample.csv")).unwrap();
        table.add_column("std_groupsize", stats::standardize(&table.values(FoxColumn::Groupsize))).unwrap();
        let summary = table.describe();
        let names: Vec<&str> = summary.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["groupsize", "area", "avgfood", "weight", "std_groupsize"]);
        assert_eq!(summary[0].count, 12);
        assert_eq!(summary[0].min, 2.0);
        assert_eq!(summary[0].max, 3.0);
    }
}
