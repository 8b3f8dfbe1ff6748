//! Loans and payments kept in a Google spreadsheet.
//!
//! The spreadsheet has a `Loans` sheet, an `Interest Payments` sheet and,
//! from layout v2 on, a `Meta` sheet recording the layout version. Columns
//! are located by header text, so sheets whose columns were reordered or
//! extended by hand keep working. Values are written `RAW`: numbers as
//! numbers, everything else as literal text.

use std::sync::Arc;

use chrono::Local;
use loanbook_core::schema::{loan_columns, payment_columns};
use loanbook_core::{
    CellValue, DerivedFields, HeaderMap, Loan, LoanId, LoanIdGenerator, LoanRecord, NewLoan,
    Payment, PaymentRecord, RowError, SchemaVersion, TableSchema, plan_loan_id_backfill,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{BoxFuture, LedgerStore, SchemaMigration};

use super::config::GoogleConfig;
use super::http::AuthorizedClient;
use super::state::ResourceCache;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const BACKEND: &str = "sheets";

/// Tables created with a new spreadsheet, in tab order.
const TABLES: [TableSchema; 3] = [TableSchema::LOANS, TableSchema::PAYMENTS, TableSchema::META];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    spreadsheet_id: String,
    #[serde(default)]
    sheets: Vec<Sheet>,
}

impl Spreadsheet {
    fn sheet_id(&self, title: &str) -> Option<i64> {
        self.sheets
            .iter()
            .find(|s| s.properties.title == title)
            .map(|s| s.properties.sheet_id)
    }
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

/// A sheet's resolved header and its data rows.
#[derive(Debug)]
struct Table {
    map: HeaderMap,
    /// Rows below the header; `rows[i]` is sheet row `i + 2`.
    rows: Vec<Vec<String>>,
}

impl Table {
    fn numbered(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(index, row)| (index + 2, row.as_slice()))
    }

    /// Decodes every readable row, logging and skipping the rest.
    fn decode<T>(
        &self,
        decode: fn(&HeaderMap, &[String], usize) -> Result<T, RowError>,
    ) -> Vec<(usize, T)> {
        self.numbered()
            .filter_map(|(number, row)| match decode(&self.map, row, number) {
                Ok(value) => Some((number, value)),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable row");
                    None
                }
            })
            .collect()
    }

    fn loan_ids(&self) -> Vec<LoanId> {
        self.numbered()
            .map(|(_, row)| LoanId::from(self.map.cell(row, loan_columns::LOAN_ID)))
            .filter(|id| !id.is_empty())
            .collect()
    }

    fn find_loan(&self, loan_id: &LoanId) -> StoreResult<(usize, &[String])> {
        self.numbered()
            .find(|(_, row)| self.map.cell(row, loan_columns::LOAN_ID) == loan_id.as_str())
            .ok_or_else(|| {
                StoreError::not_found(format!("no loan with id {}", loan_id)).with_backend(BACKEND)
            })
    }
}

/// [`LedgerStore`] over the Sheets v4 API.
pub struct SheetsStore {
    client: AuthorizedClient,
    config: GoogleConfig,
    cache: Arc<ResourceCache>,
    spreadsheet_id: OnceCell<String>,
}

impl SheetsStore {
    pub fn new(client: AuthorizedClient, config: GoogleConfig, cache: Arc<ResourceCache>) -> Self {
        Self {
            client,
            config,
            cache,
            spreadsheet_id: OnceCell::new(),
        }
    }

    /// The spreadsheet in use, found or created on first call.
    pub async fn spreadsheet_id(&self) -> StoreResult<&str> {
        self.spreadsheet_id
            .get_or_try_init(|| self.open_or_create())
            .await
            .map(String::as_str)
    }

    async fn open_or_create(&self) -> StoreResult<String> {
        if let Some(id) = &self.config.spreadsheet_id {
            let spreadsheet = self.metadata(id).await?.ok_or_else(|| {
                StoreError::not_found(format!("configured spreadsheet {} does not exist", id))
                    .with_backend(BACKEND)
            })?;
            self.ensure_tables(&spreadsheet).await?;
            return Ok(spreadsheet.spreadsheet_id);
        }

        if let Some(id) = self.cache.spreadsheet_id() {
            match self.metadata(&id).await? {
                Some(spreadsheet) => {
                    debug!(spreadsheet_id = %id, "using remembered spreadsheet");
                    self.ensure_tables(&spreadsheet).await?;
                    return Ok(spreadsheet.spreadsheet_id);
                }
                None => warn!(spreadsheet_id = %id, "remembered spreadsheet is gone"),
            }
        }

        let id = self.create_spreadsheet().await?;
        self.cache.set_spreadsheet_id(Some(id.clone()))?;
        Ok(id)
    }

    /// Sheet titles and ids, or `None` if the spreadsheet does not exist.
    async fn metadata(&self, id: &str) -> StoreResult<Option<Spreadsheet>> {
        let url = format!(
            "{}/{}?fields=spreadsheetId,sheets.properties(sheetId,title)",
            SHEETS_API,
            urlencoding::encode(id)
        );
        self.client.get_optional(&url).await
    }

    async fn create_spreadsheet(&self) -> StoreResult<String> {
        let spreadsheet: Spreadsheet = self
            .client
            .post(SHEETS_API, &create_body(&self.config.spreadsheet_name))
            .await?;
        let id = spreadsheet.spreadsheet_id.clone();
        info!(spreadsheet_id = %id, name = %self.config.spreadsheet_name, "created spreadsheet");

        let data: Vec<Value> = [TableSchema::LOANS, TableSchema::PAYMENTS]
            .iter()
            .map(|schema| value_range(&schema.header_range(), vec![header_cells(schema)]))
            .chain(std::iter::once(value_range(
                &TableSchema::META.full_range(),
                SchemaVersion::CURRENT.meta_rows(),
            )))
            .collect();
        self.batch_update_values(&id, data).await?;

        let header_sheets: Vec<i64> = [TableSchema::LOANS, TableSchema::PAYMENTS]
            .iter()
            .filter_map(|schema| spreadsheet.sheet_id(schema.sheet))
            .collect();
        self.format_headers(&id, &header_sheets).await;
        Ok(id)
    }

    /// Adds a `Loans` or `Interest Payments` sheet the spreadsheet lacks.
    async fn ensure_tables(&self, spreadsheet: &Spreadsheet) -> StoreResult<()> {
        let id = &spreadsheet.spreadsheet_id;
        for schema in [TableSchema::LOANS, TableSchema::PAYMENTS] {
            if spreadsheet.sheet_id(schema.sheet).is_some() {
                continue;
            }
            warn!(sheet = schema.sheet, "spreadsheet is missing a sheet, adding it");
            let sheet_id = self.add_sheet(id, schema.sheet).await?;
            self.write_header(id, &schema).await?;
            self.format_headers(id, &[sheet_id]).await;
        }
        Ok(())
    }

    async fn add_sheet(&self, id: &str, title: &str) -> StoreResult<i64> {
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "frozenRowCount": 1 }
                    }
                }
            }]
        });
        let response: BatchUpdateResponse = self.client.post(&batch_url(id), &body).await?;
        response
            .replies
            .first()
            .and_then(|reply| reply.pointer("/addSheet/properties/sheetId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                StoreError::invalid_response("addSheet reply carried no sheet id")
                    .with_backend(BACKEND)
            })
    }

    async fn write_header(&self, id: &str, schema: &TableSchema) -> StoreResult<()> {
        self.batch_update_values(id, vec![value_range(&schema.header_range(), vec![
            header_cells(schema),
        ])])
        .await
    }

    /// Colours the header rows. Failure only costs looks, so it is logged.
    async fn format_headers(&self, id: &str, sheet_ids: &[i64]) {
        if sheet_ids.is_empty() {
            return;
        }
        let result: StoreResult<Value> = self
            .client
            .post(&batch_url(id), &header_format_body(sheet_ids))
            .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to format header rows");
        }
    }

    async fn read_values(&self, id: &str, range: &str) -> StoreResult<Vec<Vec<String>>> {
        let range: ValueRange = self
            .client
            .get(&format!("{}?majorDimension=ROWS", values_url(id, range)))
            .await?;
        Ok(text_rows(range.values))
    }

    async fn batch_update_values(&self, id: &str, data: Vec<Value>) -> StoreResult<()> {
        let url = format!("{}/{}/values:batchUpdate", SHEETS_API, urlencoding::encode(id));
        let body = json!({ "valueInputOption": "RAW", "data": data });
        let _: Value = self.client.post(&url, &body).await?;
        Ok(())
    }

    /// Reads a table, writing the header first if the sheet is blank.
    async fn load_table(&self, schema: TableSchema) -> StoreResult<Table> {
        let id = self.spreadsheet_id().await?;
        let mut rows = self.read_values(id, &schema.full_range()).await?;
        if rows.is_empty() {
            debug!(sheet = schema.sheet, "sheet is blank, writing header");
            self.write_header(id, &schema).await?;
            return Ok(Table {
                map: HeaderMap::default_for(schema),
                rows,
            });
        }
        let header = rows.remove(0);
        let map = HeaderMap::resolve(schema, &header)
            .map_err(|e| StoreError::from(e).with_backend(BACKEND))?;
        Ok(Table { map, rows })
    }

    async fn append_row(&self, map: &HeaderMap, row: Vec<CellValue>) -> StoreResult<()> {
        let id = self.spreadsheet_id().await?;
        let schema = map.schema();
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            values_url(id, &schema.append_range(map.width()))
        );
        let body = json!({ "majorDimension": "ROWS", "values": [row] });
        let _: Value = self.client.post(&url, &body).await?;
        debug!(sheet = schema.sheet, "appended row");
        Ok(())
    }

    async fn read_version(&self) -> StoreResult<(SchemaVersion, bool)> {
        let id = self.spreadsheet_id().await?;
        let spreadsheet = self.metadata(id).await?.ok_or_else(|| {
            StoreError::not_found("spreadsheet disappeared").with_backend(BACKEND)
        })?;
        if spreadsheet.sheet_id(TableSchema::META.sheet).is_none() {
            return Ok((SchemaVersion::from_meta(None), false));
        }
        let rows = self.read_values(id, &TableSchema::META.full_range()).await?;
        Ok((SchemaVersion::from_meta(Some(rows.as_slice())), true))
    }

    async fn migrate(&self) -> StoreResult<SchemaMigration> {
        let (version, has_meta) = self.read_version().await?;
        if version.is_unsupported() {
            return Err(StoreError::schema(format!(
                "spreadsheet uses layout {} but this release understands up to {}",
                version,
                SchemaVersion::CURRENT
            ))
            .with_backend(BACKEND));
        }
        if !version.needs_migration() {
            return Ok(SchemaMigration::up_to_date(version));
        }

        info!(from = %version, to = %SchemaVersion::CURRENT, "upgrading spreadsheet layout");
        let id = self.spreadsheet_id().await?;
        let loans: Vec<Loan> = self
            .load_table(TableSchema::LOANS)
            .await?
            .decode(LoanRecord::decode)
            .into_iter()
            .map(|(_, loan)| loan)
            .collect();
        let payments_table = self.load_table(TableSchema::PAYMENTS).await?;
        let payments = payments_table.decode(PaymentRecord::decode);
        let plan = plan_loan_id_backfill(&loans, &payments);

        if !plan.is_empty() {
            let column = payments_table
                .map
                .position(payment_columns::LOAN_ID)
                .ok_or_else(|| StoreError::schema("payments sheet has no loan id column"))?;
            let data = plan
                .iter()
                .map(|backfill| {
                    value_range(
                        &TableSchema::PAYMENTS.cell_range(column, backfill.row),
                        vec![vec![CellValue::text(backfill.loan_id.as_str())]],
                    )
                })
                .collect();
            self.batch_update_values(id, data).await?;
        }

        // The version is written last so an interrupted upgrade runs again.
        if !has_meta {
            self.add_sheet(id, TableSchema::META.sheet).await?;
        }
        self.batch_update_values(id, vec![value_range(
            &TableSchema::META.full_range(),
            SchemaVersion::CURRENT.meta_rows(),
        )])
        .await?;

        info!(backfilled = plan.len(), "spreadsheet layout upgraded");
        Ok(SchemaMigration {
            from: version,
            to: SchemaVersion::CURRENT,
            backfilled_payments: plan.len(),
        })
    }
}

impl LedgerStore for SheetsStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn list_loans(&self) -> BoxFuture<'_, StoreResult<Vec<Loan>>> {
        Box::pin(async move {
            let table = self.load_table(TableSchema::LOANS).await?;
            Ok(table
                .decode(LoanRecord::decode)
                .into_iter()
                .map(|(_, loan)| loan)
                .collect())
        })
    }

    fn list_payments(&self) -> BoxFuture<'_, StoreResult<Vec<Payment>>> {
        Box::pin(async move {
            let table = self.load_table(TableSchema::PAYMENTS).await?;
            Ok(table
                .decode(PaymentRecord::decode)
                .into_iter()
                .map(|(_, payment)| payment)
                .collect())
        })
    }

    fn append_loan(&self, loan: NewLoan) -> BoxFuture<'_, StoreResult<LoanId>> {
        Box::pin(async move {
            let table = self.load_table(TableSchema::LOANS).await?;
            let existing = table.loan_ids();
            let loan_id = LoanIdGenerator::next(Local::now().date_naive(), existing.iter());
            let loan = loan.into_loan(loan_id.clone());
            self.append_row(&table.map, table.map.layout(None, LoanRecord::encode(&loan)))
                .await?;
            info!(%loan_id, borrower = %loan.borrower_name, "loan added");
            Ok(loan_id)
        })
    }

    fn append_payment(&self, payment: Payment) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let table = self.load_table(TableSchema::PAYMENTS).await?;
            let row = table.map.layout(None, PaymentRecord::encode(&payment));
            self.append_row(&table.map, row).await?;
            info!(borrower = %payment.borrower_name, amount = %payment.amount, "payment recorded");
            Ok(())
        })
    }

    fn write_derived_fields<'a>(
        &'a self,
        loan_id: &'a LoanId,
        derived: &'a DerivedFields,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let table = self.load_table(TableSchema::LOANS).await?;
            let (row, _) = table.find_loan(loan_id)?;
            let data = LoanRecord::encode_derived(derived)
                .into_iter()
                .filter_map(|(column, value)| {
                    table.map.position(column).map(|index| {
                        value_range(
                            &TableSchema::LOANS.cell_range(index, row),
                            vec![vec![value]],
                        )
                    })
                })
                .collect();
            let id = self.spreadsheet_id().await?;
            self.batch_update_values(id, data).await?;
            debug!(%loan_id, row, "derived fields written");
            Ok(())
        })
    }

    fn update_loan<'a>(&'a self, loan: &'a Loan) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let table = self.load_table(TableSchema::LOANS).await?;
            let (row, base) = table.find_loan(&loan.loan_id)?;
            let cells = table.map.layout(Some(base), LoanRecord::encode(loan));
            let range = TableSchema::LOANS.row_range(row, table.map.width());
            let id = self.spreadsheet_id().await?;
            let url = format!("{}?valueInputOption=RAW", values_url(id, &range));
            let body = json!({ "range": range, "majorDimension": "ROWS", "values": [cells] });
            let _: Value = self.client.put(&url, &body).await?;
            info!(loan_id = %loan.loan_id, row, "loan updated");
            Ok(())
        })
    }

    fn schema_version(&self) -> BoxFuture<'_, StoreResult<SchemaVersion>> {
        Box::pin(async move { self.read_version().await.map(|(version, _)| version) })
    }

    fn migrate_schema(&self) -> BoxFuture<'_, StoreResult<SchemaMigration>> {
        Box::pin(self.migrate())
    }

    fn web_url(&self) -> BoxFuture<'_, StoreResult<String>> {
        Box::pin(async move {
            let id = self.spreadsheet_id().await?;
            Ok(format!("https://docs.google.com/spreadsheets/d/{}/edit", id))
        })
    }
}

fn batch_url(id: &str) -> String {
    format!("{}/{}:batchUpdate", SHEETS_API, urlencoding::encode(id))
}

fn values_url(id: &str, range: &str) -> String {
    format!(
        "{}/{}/values/{}",
        SHEETS_API,
        urlencoding::encode(id),
        urlencoding::encode(range)
    )
}

fn header_cells(schema: &TableSchema) -> Vec<CellValue> {
    schema.columns.iter().map(|c| CellValue::text(*c)).collect()
}

fn value_range(range: &str, values: Vec<Vec<CellValue>>) -> Value {
    json!({ "range": range, "majorDimension": "ROWS", "values": values })
}

fn create_body(title: &str) -> Value {
    let sheets: Vec<Value> = TABLES
        .iter()
        .map(|schema| {
            json!({
                "properties": {
                    "title": schema.sheet,
                    "gridProperties": { "frozenRowCount": 1 }
                }
            })
        })
        .collect();
    json!({ "properties": { "title": title }, "sheets": sheets })
}

fn header_format_body(sheet_ids: &[i64]) -> Value {
    let requests: Vec<Value> = sheet_ids
        .iter()
        .map(|sheet_id| {
            json!({
                "repeatCell": {
                    "range": { "sheetId": sheet_id, "startRowIndex": 0, "endRowIndex": 1 },
                    "cell": {
                        "userEnteredFormat": {
                            "backgroundColor": { "red": 0.39, "green": 0.4, "blue": 0.95 },
                            "textFormat": {
                                "foregroundColor": { "red": 1.0, "green": 1.0, "blue": 1.0 },
                                "bold": true
                            }
                        }
                    },
                    "fields": "userEnteredFormat(backgroundColor,textFormat)"
                }
            })
        })
        .collect();
    json!({ "requests": requests })
}

/// Cells as the text a person sees in the sheet.
fn text_rows(values: Vec<Vec<Value>>) -> Vec<Vec<String>> {
    values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    Value::String(text) => text,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_has_three_frozen_sheets() {
        let body = create_body("Loan Data");
        assert_eq!(body["properties"]["title"], "Loan Data");
        let titles: Vec<&str> = body["sheets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["properties"]["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Loans", "Interest Payments", "Meta"]);
        assert_eq!(body["sheets"][1]["properties"]["gridProperties"]["frozenRowCount"], 1);
    }

    #[test]
    fn header_format_targets_first_row() {
        let body = header_format_body(&[0, 42]);
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["repeatCell"]["range"]["sheetId"], 42);
        assert_eq!(requests[1]["repeatCell"]["range"]["endRowIndex"], 1);
        assert_eq!(
            requests[0]["repeatCell"]["cell"]["userEnteredFormat"]["textFormat"]["bold"],
            true
        );
    }

    #[test]
    fn ranges_are_escaped_in_urls() {
        let url = values_url("abc", &TableSchema::PAYMENTS.header_range());
        assert_eq!(
            url,
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/%27Interest%20Payments%27%21A1%3AI1"
        );
    }

    #[test]
    fn cells_read_as_text() {
        let rows = text_rows(vec![vec![json!("Anil"), json!(1000), json!(null), json!(true)]]);
        assert_eq!(rows, vec![vec!["Anil", "1000", "", "true"]]);
    }

    #[test]
    fn numbers_are_written_as_numbers() {
        let range = value_range(
            "'Loans'!A2:B2",
            vec![vec![CellValue::text("LOAN-1"), CellValue::number(1500)]],
        );
        assert_eq!(range["values"], json!([["LOAN-1", 1500]]));
    }

    fn table(rows: &[&[&str]]) -> Table {
        Table {
            map: HeaderMap::default_for(TableSchema::LOANS),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn table_rows_are_numbered_from_two_and_skip_blanks() {
        let table = table(&[
            &["LOAN-20240305-001", "2024-03-05", "Anil", "1000", "1"],
            &["", ""],
            &["LOAN-20240306-001", "2024-03-06", "Ravi", "500", "2"],
        ]);
        let numbers: Vec<usize> = table.numbered().map(|(n, _)| n).collect();
        assert_eq!(numbers, vec![2, 4]);
        assert_eq!(table.loan_ids().len(), 2);

        let (row, _) = table.find_loan(&LoanId::from("LOAN-20240306-001")).unwrap();
        assert_eq!(row, 4);
        assert!(table.find_loan(&LoanId::from("LOAN-X")).is_err());
    }

    #[test]
    fn unreadable_rows_are_skipped() {
        let table = table(&[
            &["LOAN-20240305-001", "2024-03-05", "Anil", "1000", "1"],
            &["LOAN-20240305-002", "someday", "Ravi", "1000", "1"],
        ]);
        let loans = table.decode(LoanRecord::decode);
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].0, 2);
        assert_eq!(loans[0].1.borrower_name, "Anil");
    }
}
