use std::{fmt, path::Path};

use jiff::civil::Date;
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{bucket::AgeingBucket, error::AgeingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    CreditNote,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::CreditNote => "credit_note",
        }
    }
}

/// One line of the exported csv file.  Bucket amounts are empty when the
/// database column is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeingFactRow {
    pub centre_id: String,
    pub class_id: String,
    pub document_id: String,
    pub document_date: Date,
    pub student_id: String,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_30: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_60: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_90: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_120: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_150: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_180: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub day_180_and_above: Option<Decimal>,
    pub document_type: DocumentType,
    pub as_at_date: Date,
}

impl AgeingFactRow {
    /// Bucket amounts in column order, nulls as zero.
    pub fn buckets(&self) -> [Decimal; 7] {
        [
            self.day_30,
            self.day_60,
            self.day_90,
            self.day_120,
            self.day_150,
            self.day_180,
            self.day_180_and_above,
        ]
        .map(|x| x.unwrap_or(Decimal::ZERO))
    }

    /// The single bucket holding an amount, `None` if the row has no amount
    /// or more than one bucket populated.
    pub fn populated_bucket(&self) -> Option<(AgeingBucket, Decimal)> {
        let mut found = None;
        for (bucket, amount) in AgeingBucket::ALL.into_iter().zip(self.buckets()) {
            if amount.is_zero() {
                continue;
            }
            if found.is_some() {
                return None;
            }
            found = Some((bucket, amount));
        }
        found
    }

    fn key(&self) -> (&str, &str, &str, &str) {
        (
            &self.centre_id,
            &self.class_id,
            &self.document_id,
            self.document_type.as_str(),
        )
    }
}

/// Totals of an exported file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub as_at_date: Date,
    pub rows: usize,
    pub invoices: usize,
    pub credit_notes: usize,
    pub bucket_totals: [Decimal; 7],
}

impl ExportSummary {
    pub fn new(as_at_date: Date) -> ExportSummary {
        ExportSummary {
            as_at_date,
            rows: 0,
            invoices: 0,
            credit_notes: 0,
            bucket_totals: [Decimal::ZERO; 7],
        }
    }

    pub fn total(&self) -> Decimal {
        self.bucket_totals.iter().sum()
    }

    pub fn bucket_total(&self, bucket: AgeingBucket) -> Decimal {
        self.bucket_totals[bucket.index()]
    }

    /// Check one row and add it to the totals.  `previous` is the row read
    /// before it, if any.
    fn add(
        &mut self,
        row: &AgeingFactRow,
        previous: Option<&AgeingFactRow>,
    ) -> Result<(), AgeingError> {
        let invalid = |reason: String| AgeingError::InvalidExport {
            as_at_date: self.as_at_date,
            document_id: row.document_id.clone(),
            reason,
        };
        if row.as_at_date != self.as_at_date {
            return Err(invalid(format!("row is for {}", row.as_at_date)));
        }
        if let Some(prev) = previous {
            if prev.key() >= row.key() {
                return Err(invalid(format!(
                    "out of order or duplicated after {}/{}/{} ({})",
                    prev.centre_id,
                    prev.class_id,
                    prev.document_id,
                    prev.document_type.as_str()
                )));
            }
        }
        let (bucket, amount) = row
            .populated_bucket()
            .ok_or_else(|| invalid("expected exactly one populated bucket".to_string()))?;
        let expected = AgeingBucket::for_dates(row.document_date, row.as_at_date);
        if bucket != expected {
            return Err(invalid(format!(
                "amount in {}, document dated {} belongs in {}",
                bucket, row.document_date, expected
            )));
        }

        self.rows += 1;
        match row.document_type {
            DocumentType::Invoice => self.invoices += 1,
            DocumentType::CreditNote => self.credit_notes += 1,
        }
        self.bucket_totals[bucket.index()] += amount;
        Ok(())
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "as at {}: {} rows ({} invoices, {} credit notes)",
            self.as_at_date, self.rows, self.invoices, self.credit_notes
        )?;
        for bucket in AgeingBucket::ALL {
            writeln!(f, "  {:<18} {:>14}", bucket.column(), self.bucket_total(bucket))?;
        }
        write!(f, "  {:<18} {:>14}", "total", self.total())
    }
}

/// Read an exported file back and verify it: every row is for `as_at_date`,
/// rows are sorted by (centre_id, class_id, document_id, document_type)
/// without duplicates,
/// and each row has its amount in exactly one bucket, the one matching its
/// age.
pub fn summarize_export(path: &Path, as_at_date: Date) -> Result<ExportSummary, AgeingError> {
    let mut rdr = csv::Reader::from_path(path)?;
    summarize(&mut rdr, as_at_date).map(|summary| {
        info!("Verified {}", path.display());
        summary
    })
}

pub fn summarize<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    as_at_date: Date,
) -> Result<ExportSummary, AgeingError> {
    let mut summary = ExportSummary::new(as_at_date);
    let mut previous: Option<AgeingFactRow> = None;
    for record in rdr.deserialize() {
        let row: AgeingFactRow = record?;
        summary.add(&row, previous.as_ref())?;
        previous = Some(row);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs};

    use jiff::civil::Date;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::ageing_fact::COLUMNS;

    fn date() -> Date {
        jiff::civil::date(2025, 7, 7)
    }

    fn reader(body: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(body.as_bytes())
    }

    fn file(rows: &[&str]) -> String {
        let mut s = COLUMNS.join(",");
        s.push('\n');
        for row in rows {
            s.push_str(row);
            s.push('\n');
        }
        s
    }

    #[test]
    fn summarize_valid_export() -> Result<(), Box<dyn Error>> {
        let body = file(&[
            // 35 days old
            "C1,K1,INV-1,2025-06-02,S1,0.00,150.00,0.00,0.00,0.00,0.00,0.00,invoice,2025-07-07",
            // 95 days old
            "C1,K1,INV-2,2025-04-03,S2,0.00,0.00,0.00,80.50,0.00,0.00,0.00,invoice,2025-07-07",
            "C1,K2,CN-1,2025-07-01,S1,-20.00,,,,,,,credit_note,2025-07-07",
            "C2,K1,INV-3,2024-12-01,S3,0,0,0,0,0,0,300.00,invoice,2025-07-07",
        ]);
        let summary = summarize(&mut reader(&body), date())?;
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.invoices, 3);
        assert_eq!(summary.credit_notes, 1);
        assert_eq!(summary.bucket_total(AgeingBucket::Day30), dec!(-20.00));
        assert_eq!(summary.bucket_total(AgeingBucket::Day60), dec!(150.00));
        assert_eq!(summary.bucket_total(AgeingBucket::Day90), Decimal::ZERO);
        assert_eq!(summary.bucket_total(AgeingBucket::Day120), dec!(80.50));
        assert_eq!(summary.bucket_total(AgeingBucket::Day180AndAbove), dec!(300.00));
        assert_eq!(summary.total(), dec!(510.50));
        Ok(())
    }

    #[test]
    fn empty_export() -> Result<(), Box<dyn Error>> {
        let summary = summarize(&mut reader(&file(&[])), date())?;
        assert_eq!(summary.rows, 0);
        assert_eq!(summary.total(), Decimal::ZERO);
        Ok(())
    }

    #[test]
    fn reject_wrong_bucket() {
        // 35 days old but in day_30
        let body = file(&[
            "C1,K1,INV-1,2025-06-02,S1,150.00,0,0,0,0,0,0,invoice,2025-07-07",
        ]);
        match summarize(&mut reader(&body), date()) {
            Err(AgeingError::InvalidExport { document_id, .. }) => {
                assert_eq!(document_id, "INV-1")
            }
            other => panic!("expected invalid export, got {:?}", other),
        }
    }

    #[test]
    fn reject_two_buckets() {
        let body = file(&[
            "C1,K1,INV-1,2025-06-02,S1,10.00,150.00,0,0,0,0,0,invoice,2025-07-07",
        ]);
        assert!(matches!(
            summarize(&mut reader(&body), date()),
            Err(AgeingError::InvalidExport { .. })
        ));
    }

    #[test]
    fn reject_other_dates() {
        let body = file(&[
            "C1,K1,INV-1,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-06",
        ]);
        assert!(matches!(
            summarize(&mut reader(&body), date()),
            Err(AgeingError::InvalidExport { .. })
        ));
    }

    #[test]
    fn reject_unsorted_and_duplicate_rows() {
        let unsorted = file(&[
            "C2,K1,INV-3,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07",
            "C1,K1,INV-1,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07",
        ]);
        assert!(matches!(
            summarize(&mut reader(&unsorted), date()),
            Err(AgeingError::InvalidExport { .. })
        ));
        let duplicated = file(&[
            "C1,K1,INV-1,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07",
            "C1,K1,INV-1,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07",
        ]);
        assert!(matches!(
            summarize(&mut reader(&duplicated), date()),
            Err(AgeingError::InvalidExport { .. })
        ));
    }

    #[test]
    fn invoice_and_credit_note_share_an_id() -> Result<(), Box<dyn Error>> {
        let body = file(&[
            "C1,K1,0042,2025-07-01,S1,-20.00,0,0,0,0,0,0,credit_note,2025-07-07",
            "C1,K1,0042,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07",
        ]);
        let summary = summarize(&mut reader(&body), date())?;
        assert_eq!(summary.invoices, 1);
        assert_eq!(summary.credit_notes, 1);
        assert_eq!(summary.total(), dec!(130.00));

        let swapped = file(&[
            "C1,K1,0042,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07",
            "C1,K1,0042,2025-07-01,S1,-20.00,0,0,0,0,0,0,credit_note,2025-07-07",
        ]);
        assert!(matches!(
            summarize(&mut reader(&swapped), date()),
            Err(AgeingError::InvalidExport { .. })
        ));
        Ok(())
    }

    #[test]
    fn summarize_file_on_disk() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ageing_fact_table_2025-07-07.csv");
        fs::write(
            &path,
            file(&["C1,K1,INV-1,2025-06-02,S1,0,150.00,0,0,0,0,0,invoice,2025-07-07"]),
        )?;
        let summary = summarize_export(&path, date())?;
        assert_eq!(summary.rows, 1);
        assert!(summary.to_string().contains("day_60"));
        Ok(())
    }

    #[test]
    fn missing_file() {
        let res = summarize_export(Path::new("does/not/exist.csv"), date());
        assert!(matches!(res, Err(AgeingError::Csv(_))));
    }
}
