//! Price data loading
//! ==================
//!
//! Two layouts are read:
//!   - bar files with `date, open, high, low, close, volume` columns, one per instrument
//!   - wide files where every numeric column is a series (one row per date)

use chrono::{NaiveDate, NaiveDateTime};
use nalgebra::DMatrix;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{CointError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(deserialize_with = "deserialize_date")]
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
}

/// `YYYY-MM-DD`, optionally followed by a time of day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

// ═══════════════════════════════════════════════════════════════════
// BAR FILES
// ═══════════════════════════════════════════════════════════════════

pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut bars = Vec::new();
    for record in rdr.deserialize() {
        bars.push(record?);
    }
    Ok(bars)
}

pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let bars = read_bars(BufReader::new(file))?;
    if bars.is_empty() {
        return Err(CointError::Data(format!("no bars in '{}'", path.display())));
    }
    info!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

/// Closing prices on the dates every feed has, as a T×L matrix.
pub fn align_closes(feeds: &[&[Bar]]) -> Result<(Vec<NaiveDate>, DMatrix<f64>)> {
    if feeds.is_empty() {
        return Err(CointError::invalid("no feeds to align"));
    }
    let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for (j, bars) in feeds.iter().enumerate() {
        for bar in bars.iter() {
            by_date.entry(bar.date).or_insert_with(|| vec![None; feeds.len()])[j] = Some(bar.close);
        }
    }

    let rows: Vec<(NaiveDate, Vec<f64>)> = by_date
        .into_iter()
        .filter_map(|(date, closes)| closes.into_iter().collect::<Option<Vec<f64>>>().map(|c| (date, c)))
        .collect();
    if rows.is_empty() {
        return Err(CointError::Data("feeds share no dates".into()));
    }

    let dates = rows.iter().map(|(d, _)| *d).collect();
    let matrix = DMatrix::from_fn(rows.len(), feeds.len(), |i, j| rows[i].1[j]);
    Ok((dates, matrix))
}

// ═══════════════════════════════════════════════════════════════════
// WIDE SERIES FILES
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    pub names: Vec<String>,
    /// T×L, NaN where a cell was missing or not numeric
    pub data: DMatrix<f64>,
}

/// Every column whose first non-empty cell parses as a number becomes a series.
pub fn read_series_csv<R: Read>(reader: R) -> Result<SeriesFrame> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|s| s.to_string()).collect();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        raw_rows.push(record.iter().map(|s| s.trim().to_string()).collect());
    }
    if raw_rows.is_empty() {
        return Err(CointError::Data("empty CSV".into()));
    }

    let numeric_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(j, _)| {
            raw_rows
                .iter()
                .find(|r| r.len() > *j && !r[*j].is_empty())
                .is_some_and(|row| row[*j].parse::<f64>().is_ok())
        })
        .map(|(j, name)| (j, name.clone()))
        .collect();

    if numeric_cols.is_empty() {
        return Err(CointError::Data("no numeric columns in CSV".into()));
    }

    let data = DMatrix::from_fn(raw_rows.len(), numeric_cols.len(), |i, j| {
        let col = numeric_cols[j].0;
        raw_rows[i]
            .get(col)
            .and_then(|cell| cell.parse::<f64>().ok())
            .unwrap_or(f64::NAN)
    });

    Ok(SeriesFrame {
        names: numeric_cols.into_iter().map(|(_, n)| n).collect(),
        data,
    })
}

pub fn load_series_csv(path: impl AsRef<Path>) -> Result<SeriesFrame> {
    let file = File::open(path.as_ref())?;
    read_series_csv(BufReader::new(file))
}

/// Forward-fill gaps, back-fill a leading gap, drop columns still incomplete.
pub fn clean_series(frame: &SeriesFrame) -> SeriesFrame {
    let (t, n) = frame.data.shape();
    let mut cols: Vec<Vec<f64>> = Vec::with_capacity(n);
    for j in 0..n {
        let mut col = Vec::with_capacity(t);
        let mut last = f64::NAN;
        for i in 0..t {
            let v = frame.data[(i, j)];
            if v.is_nan() {
                col.push(last);
            } else {
                last = v;
                col.push(v);
            }
        }
        if let Some(first_valid) = col.iter().position(|x| !x.is_nan()) {
            let fill = col[first_valid];
            col[..first_valid].iter_mut().for_each(|x| *x = fill);
        }
        cols.push(col);
    }

    let valid: Vec<usize> = (0..n).filter(|&j| !cols[j].iter().any(|x| x.is_nan())).collect();
    if valid.len() < n {
        warn!(dropped = n - valid.len(), "columns without any value dropped");
    }

    SeriesFrame {
        names: valid.iter().map(|&j| frame.names[j].clone()).collect(),
        data: DMatrix::from_fn(t, valid.len(), |i, j| cols[valid[j]][i]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARS: &str = "\
date,open,high,low,close,volume,openinterest
2020-01-02,10,11,9,10.5,1000,0
2020-01-03 00:00:00,10.5,12,10,11.5,1500,0
2020-01-06,11.5,12,11,11,900,0
";

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        assert_eq!(parse_date("2020-01-03"), Some(d));
        assert_eq!(parse_date("2020-01-03 16:00:00"), Some(d));
        assert_eq!(parse_date("2020-01-03T16:00:00"), Some(d));
        assert_eq!(parse_date("03/01/2020"), None);
    }

    #[test]
    fn test_read_bars_ignores_extra_columns() {
        let bars = read_bars(BARS.as_bytes()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2020, 1, 3).unwrap());
        assert_eq!(bars[1].close, 11.5);
        assert_eq!(bars[2].volume, 900.0);
    }

    #[test]
    fn test_read_bars_bad_date() {
        let r = read_bars("date,open,high,low,close,volume\nyesterday,1,1,1,1,1\n".as_bytes());
        assert!(matches!(r, Err(CointError::Csv(_))));
    }

    #[test]
    fn test_load_bars_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "date,open,high,low,close,volume\n").unwrap();
        assert!(matches!(load_bars(file.path()), Err(CointError::Data(_))));
    }

    #[test]
    fn test_align_closes_inner_join() {
        let a = read_bars(BARS.as_bytes()).unwrap();
        let b: Vec<Bar> = a[1..]
            .iter()
            .map(|bar| Bar { close: bar.close * 2.0, ..*bar })
            .collect();
        let (dates, m) = align_closes(&[&a, &b]).unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 0)], 11.5);
        assert_eq!(m[(0, 1)], 23.0);
        assert_eq!(m[(1, 1)], 22.0);
    }

    #[test]
    fn test_align_closes_disjoint() {
        let a = read_bars(BARS.as_bytes()).unwrap();
        let r = align_closes(&[&a[..1], &a[1..]]);
        assert!(matches!(r, Err(CointError::Data(_))));
    }

    #[test]
    fn test_read_series_csv_and_clean() {
        let csv = "date,AAA,BBB,name,CCC\n\
                   2020-01-01,,1.0,x,\n\
                   2020-01-02,2.0,,y,\n\
                   2020-01-03,3.0,4.0,z,\n";
        let frame = read_series_csv(csv.as_bytes()).unwrap();
        assert_eq!(frame.names, vec!["AAA", "BBB"]);
        assert!(frame.data[(0, 0)].is_nan());

        let clean = clean_series(&frame);
        assert_eq!(clean.names, vec!["AAA", "BBB"]);
        assert_eq!(clean.data.column(0).iter().copied().collect::<Vec<_>>(), vec![2.0, 2.0, 3.0]);
        assert_eq!(clean.data.column(1).iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, 4.0]);
    }

    #[test]
    fn test_clean_drops_empty_column() {
        let frame = SeriesFrame {
            names: vec!["A".into(), "B".into()],
            data: DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 2.0, f64::NAN]),
        };
        let clean = clean_series(&frame);
        assert_eq!(clean.names, vec!["A"]);
        assert_eq!(clean.data.shape(), (2, 1));
    }
}
