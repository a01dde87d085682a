use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use super::{ConditionData, DataError, ExperimentData, Protocol};

#[derive(Default)]
struct Series {
    times: Vec<Vec<f64>>,
    counts: Vec<Vec<f64>>,
    ints: Vec<Vec<f64>>,
}

fn numbers(record: &StringRecord, line: u64) -> Result<Vec<f64>, DataError> {
    record
        .iter()
        .skip(3)
        .filter(|field| !field.is_empty())
        .map(|field| {
            field.parse::<f64>().map_err(|_| DataError::NumberError {
                line,
                value: field.to_string(),
            })
        })
        .collect()
}

/// Parse a tab-delimited experiment export.
///
/// Every row reads `condition  sample  TAG  v1  v2 ...`. Rows whose condition
/// is `continuous` or `pulsatile` and whose tag is `TIMES:`, `COUNTS:` or
/// `TOTALINTS:` are kept, in file order; all other rows are skipped. The
/// n-th `TIMES:` row of a condition pairs with its n-th `COUNTS:` and
/// `TOTALINTS:` rows.
pub fn parse_experiments<R: Read>(reader: R) -> Result<ExperimentData, DataError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader);

    let mut series: BTreeMap<Protocol, Series> = BTreeMap::new();
    for result in reader.records() {
        let record = result.map_err(|e| DataError::CSVError(e.to_string()))?;
        let line = record.position().map_or(0, |p| p.line());
        if record.len() < 3 {
            if record.iter().all(str::is_empty) {
                continue;
            }
            return Err(DataError::ShortRow {
                line,
                found: record.len(),
            });
        }

        let Ok(protocol) = record[0].parse::<Protocol>() else {
            continue;
        };
        let entry = series.entry(protocol).or_default();
        match &record[2] {
            "TIMES:" => entry.times.push(numbers(&record, line)?),
            "COUNTS:" => entry.counts.push(numbers(&record, line)?),
            "TOTALINTS:" => entry.ints.push(numbers(&record, line)?),
            _ => continue,
        }
    }

    let conditions = series
        .into_iter()
        .map(|(protocol, s)| {
            ConditionData::new(protocol, s.times, s.counts, s.ints).map(|c| (protocol, c))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(ExperimentData::new(conditions))
}

/// Read an experiment export from disk, see [parse_experiments]
pub fn load_experiments(path: impl AsRef<Path>) -> Result<ExperimentData, DataError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| DataError::CSVError(format!("{}: {}", path.display(), e)))?;
    let data = parse_experiments(file)?;
    tracing::debug!(
        "Loaded {} protocols from {}",
        data.protocols().count(),
        path.display()
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EndTimes, Measure};

    const EXPORT: &str = "\
continuous\ts01\tTIMES:\t0.0\t20.0\t40.0\t45.0
continuous\ts01\tCOUNTS:\t0\t12\t30\t31
continuous\ts01\tTOTALINTS:\t0.0\t1500.0\t3000.0\t3100.0
continuous\ts01\tMEANINTS:\t0.0\t125.0\t100.0\t100.0
pulsatile\ts02\tTIMES:\t0.0\t16.0\t32.0
pulsatile\ts02\tCOUNTS:\t1\t8\t2
pulsatile\ts02\tTOTALINTS:\t60.0\t900.0\t150.0
pulsatile\ts03\tTIMES:\t0.0\t10.0
pulsatile\ts03\tCOUNTS:\t0\t4
pulsatile\ts03\tTOTALINTS:\t0.0\t330.0
control\ts04\tTIMES:\t0.0\t1.0
";

    #[test]
    fn test_parse_groups_rows_by_protocol() {
        let data = parse_experiments(EXPORT.as_bytes()).unwrap();
        assert_eq!(
            data.protocols().collect::<Vec<_>>(),
            vec![Protocol::Continuous, Protocol::Pulsatile]
        );

        let continuous = data.condition(Protocol::Continuous).unwrap();
        assert_eq!(continuous.replicates(), 1);
        assert_eq!(continuous.times()[0], vec![0.0, 20.0, 40.0, 45.0]);
        assert_eq!(continuous.counts()[0], vec![0.0, 12.0, 30.0, 31.0]);

        let pulsatile = data.condition(Protocol::Pulsatile).unwrap();
        assert_eq!(pulsatile.replicates(), 2);
        assert_eq!(pulsatile.ints()[1], vec![0.0, 330.0]);
    }

    #[test]
    fn test_parse_then_prepare() {
        let data = parse_experiments(EXPORT.as_bytes())
            .unwrap()
            .truncate(&EndTimes::default())
            .rescale_intensity(300.0);
        let dataset = data
            .dataset(Protocol::Continuous, 0, Measure::TotalIntensity)
            .unwrap();
        assert_eq!(dataset.times(), &[0.0, 20.0, 40.0]);
        assert_eq!(dataset.values(), &[0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_trailing_tabs_and_blank_lines() {
        let export = "pulsatile\ts\tTIMES:\t1\t2\t\n\npulsatile\ts\tCOUNTS:\t3\t4\npulsatile\ts\tTOTALINTS:\t5\t6\n";
        let data = parse_experiments(export.as_bytes()).unwrap();
        let pulsatile = data.condition(Protocol::Pulsatile).unwrap();
        assert_eq!(pulsatile.times()[0], vec![1.0, 2.0]);
    }

    #[test]
    fn test_bad_number() {
        let export = "continuous\ts\tTIMES:\t0.0\tten\n";
        let err = parse_experiments(export.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            DataError::NumberError {
                line: 1,
                value: "ten".to_string()
            }
        );
    }

    #[test]
    fn test_short_row() {
        let err = parse_experiments("continuous\ts01\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::ShortRow { found: 2, .. }));
    }

    #[test]
    fn test_missing_series() {
        let export = "continuous\ts\tTIMES:\t0.0\ncontinuous\ts\tCOUNTS:\t1\n";
        let err = parse_experiments(export.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::UnpairedSeries { ints: 0, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_experiments("/nonexistent/export.tsv").unwrap_err();
        assert!(matches!(err, DataError::CSVError(_)));
    }
}
