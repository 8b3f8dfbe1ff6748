//! Spreadsheet layout.
//!
//! Each table is a sheet whose first row holds column headers. Rows are
//! decoded through a [`HeaderMap`] built from that header row, so a column
//! moved by hand in the spreadsheet still lands in the right field. Only a
//! missing column is an error.
//!
//! The layout version lives in the `Meta` sheet; see [`crate::migration`].

use std::collections::HashMap;

use thiserror::Error;

use crate::record::CellValue;

/// Current layout version written to new spreadsheets.
pub const SCHEMA_VERSION: u32 = 2;

/// Loan table column headers.
pub mod loan_columns {
    pub const LOAN_ID: &str = "Loan ID";
    pub const DATE_GIVEN: &str = "Date Given";
    pub const NAME: &str = "Name";
    pub const AMOUNT: &str = "Amount Lent";
    pub const RATE: &str = "Monthly Interest Rate (%)";
    pub const DETAILS: &str = "Details";
    pub const VIA: &str = "Via";
    pub const PRO_NOTE: &str = "Has Pro Note";
    pub const STATUS: &str = "Status";
    pub const DATE_OF_CLOSURE: &str = "Date of Closure";
    pub const CONTACTS: &str = "Contacts (JSON)";
    pub const LAST_PAYMENT_DATE: &str = "Last Interest Payment Date";
    pub const TOTAL_INTEREST_PAID: &str = "Total Interest Paid";
    pub const PAID_THROUGH_MONTH: &str = "Paid Till Month";
    pub const ATTACHMENTS: &str = "Attachments";
}

/// Payment table column headers.
pub mod payment_columns {
    pub const PAYMENT_DATE: &str = "Payment Date";
    pub const LOAN_ID: &str = "Loan ID";
    pub const BORROWER_NAME: &str = "Borrower Name";
    pub const AMOUNT: &str = "Amount Received";
    pub const PAYMENT_TYPE: &str = "Payment Type";
    pub const PAYMENT_METHOD: &str = "Payment Method";
    pub const RECEIVED_BY: &str = "Received By";
    pub const ATTACHMENTS: &str = "Attachments";
    pub const NOTES: &str = "Notes";
}

/// Named columns of one sheet, in the order new sheets are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Sheet (tab) title.
    pub sheet: &'static str,
    /// Column headers in layout order.
    pub columns: &'static [&'static str],
}

impl TableSchema {
    /// The `Loans` sheet.
    pub const LOANS: TableSchema = TableSchema {
        sheet: "Loans",
        columns: &[
            loan_columns::LOAN_ID,
            loan_columns::DATE_GIVEN,
            loan_columns::NAME,
            loan_columns::AMOUNT,
            loan_columns::RATE,
            loan_columns::DETAILS,
            loan_columns::VIA,
            loan_columns::PRO_NOTE,
            loan_columns::STATUS,
            loan_columns::DATE_OF_CLOSURE,
            loan_columns::CONTACTS,
            loan_columns::LAST_PAYMENT_DATE,
            loan_columns::TOTAL_INTEREST_PAID,
            loan_columns::PAID_THROUGH_MONTH,
            loan_columns::ATTACHMENTS,
        ],
    };

    /// The `Interest Payments` sheet.
    pub const PAYMENTS: TableSchema = TableSchema {
        sheet: "Interest Payments",
        columns: &[
            payment_columns::PAYMENT_DATE,
            payment_columns::LOAN_ID,
            payment_columns::BORROWER_NAME,
            payment_columns::AMOUNT,
            payment_columns::PAYMENT_TYPE,
            payment_columns::PAYMENT_METHOD,
            payment_columns::RECEIVED_BY,
            payment_columns::ATTACHMENTS,
            payment_columns::NOTES,
        ],
    };

    /// The `Meta` sheet holding `schema_version`.
    pub const META: TableSchema = TableSchema {
        sheet: "Meta",
        columns: &["Key", "Value"],
    };

    /// Number of columns in the default layout.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Header row for a new sheet.
    pub fn header_row(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.to_string()).collect()
    }

    /// A1 range covering the whole sheet.
    pub fn full_range(&self) -> String {
        quote_sheet(self.sheet)
    }

    /// A1 range of the header row.
    pub fn header_range(&self) -> String {
        format!(
            "{}!A1:{}1",
            quote_sheet(self.sheet),
            column_letter(self.width() - 1)
        )
    }

    /// A1 range used when appending rows.
    pub fn append_range(&self, width: usize) -> String {
        format!(
            "{}!A:{}",
            quote_sheet(self.sheet),
            column_letter(width.max(1) - 1)
        )
    }

    /// A1 range of one whole row (1-based row number).
    pub fn row_range(&self, row: usize, width: usize) -> String {
        format!(
            "{}!A{row}:{}{row}",
            quote_sheet(self.sheet),
            column_letter(width.max(1) - 1)
        )
    }

    /// A1 reference of one cell (0-based column, 1-based row).
    pub fn cell_range(&self, column: usize, row: usize) -> String {
        format!("{}!{}{}", quote_sheet(self.sheet), column_letter(column), row)
    }
}

/// Quotes a sheet title for A1 notation.
fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Spreadsheet column letters for a 0-based index: 0 → `A`, 26 → `AA`.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A sheet's header row that cannot be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("sheet '{sheet}' has no header row")]
    EmptyHeader { sheet: &'static str },
    #[error("sheet '{sheet}' is missing columns: {}", columns.join(", "))]
    MissingColumns {
        sheet: &'static str,
        columns: Vec<&'static str>,
    },
}

/// Column positions of one sheet, resolved from its header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    schema: TableSchema,
    positions: HashMap<&'static str, usize>,
    width: usize,
}

impl HeaderMap {
    /// Matches every schema column against `header` (trimmed, case-insensitive).
    pub fn resolve(schema: TableSchema, header: &[String]) -> Result<Self, SchemaError> {
        if header.iter().all(|h| h.trim().is_empty()) {
            return Err(SchemaError::EmptyHeader {
                sheet: schema.sheet,
            });
        }

        let mut positions = HashMap::new();
        let mut missing = Vec::new();
        for &column in schema.columns {
            match header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column))
            {
                Some(index) => {
                    positions.insert(column, index);
                }
                None => missing.push(column),
            }
        }

        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                sheet: schema.sheet,
                columns: missing,
            });
        }

        Ok(Self {
            schema,
            positions,
            width: header.len(),
        })
    }

    /// The layout of a freshly created sheet.
    pub fn default_for(schema: TableSchema) -> Self {
        let positions = schema
            .columns
            .iter()
            .enumerate()
            .map(|(index, &column)| (column, index))
            .collect();
        Self {
            schema,
            positions,
            width: schema.width(),
        }
    }

    pub fn schema(&self) -> TableSchema {
        self.schema
    }

    /// Number of columns in the sheet, including ones the schema does not name.
    pub fn width(&self) -> usize {
        self.width
    }

    /// 0-based position of a schema column.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Cell text of `column` in `row`; short rows read as blank.
    pub fn cell<'a>(&self, row: &'a [String], column: &str) -> &'a str {
        self.position(column)
            .and_then(|index| row.get(index))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    /// Lays out `cells` in sheet order.
    ///
    /// Columns the schema does not know keep their text from `base`, so
    /// rewriting a row does not wipe columns the user added by hand.
    pub fn layout(
        &self,
        base: Option<&[String]>,
        cells: Vec<(&'static str, CellValue)>,
    ) -> Vec<CellValue> {
        let mut row: Vec<CellValue> = (0..self.width)
            .map(|index| {
                base.and_then(|b| b.get(index))
                    .map(|text| CellValue::Text(text.clone()))
                    .unwrap_or_else(CellValue::empty)
            })
            .collect();
        for (column, value) in cells {
            if let Some(index) = self.position(column) {
                row[index] = value;
            }
        }
        row
    }
}
