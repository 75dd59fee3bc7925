//! Fixed read strategies over a single table

use super::template::QueryTemplate;
use super::{DbError, Session};
use crate::data::{Row, Value};

/// Separator placed between columns by [`rows_to_string`]
pub const COLUMN_SEPARATOR: &str = "\t#\t";

/// How a [`RowReader`] queries its table
#[derive(Debug, Clone)]
pub enum ReadStrategy {
    /// Only the final row of the table
    LastRow,
    /// Every row, in table order
    AllRows,
    /// `MAX(column)` as a single aggregate row
    MaxValue { column: String },
    /// `SELECT * FROM table <fragment>` with positional parameters
    Condition(QueryTemplate),
}

/// Reads rows from one table with one fixed strategy
#[derive(Debug, Clone)]
pub struct RowReader {
    table: String,
    strategy: ReadStrategy,
}

impl RowReader {
    pub fn new(table: impl Into<String>, strategy: ReadStrategy) -> Self {
        Self {
            table: table.into(),
            strategy,
        }
    }

    pub fn last_row(table: impl Into<String>) -> Self {
        Self::new(table, ReadStrategy::LastRow)
    }

    pub fn all_rows(table: impl Into<String>) -> Self {
        Self::new(table, ReadStrategy::AllRows)
    }

    pub fn max_value(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(
            table,
            ReadStrategy::MaxValue {
                column: column.into(),
            },
        )
    }

    pub fn condition(table: impl Into<String>, template: QueryTemplate) -> Self {
        Self::new(table, ReadStrategy::Condition(template))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn strategy(&self) -> &ReadStrategy {
        &self.strategy
    }

    /// Run the strategy
    ///
    /// `params` only applies to [`ReadStrategy::Condition`]; without it the
    /// fragment is used verbatim. Returns `None` when a last-row or max-value
    /// read finds nothing. Query failures propagate.
    pub fn read(
        &self,
        session: &mut dyn Session,
        params: Option<&[Value]>,
    ) -> Result<Option<Vec<Row>>, DbError> {
        match &self.strategy {
            ReadStrategy::LastRow => {
                let mut rows = session.execute(&self.select_all(), &[])?;
                Ok(rows.pop().map(|row| vec![row]))
            }
            ReadStrategy::AllRows => session.execute(&self.select_all(), &[]).map(Some),
            ReadStrategy::MaxValue { column } => {
                let sql = format!("SELECT MAX({}) FROM {}", column, self.table);
                let mut rows = session.execute(&sql, &[])?;
                if rows.is_empty() {
                    return Ok(None);
                }
                rows.truncate(1);
                Ok(Some(rows))
            }
            ReadStrategy::Condition(template) => {
                let (fragment, bound) = match params {
                    Some(params) => {
                        let rendered = template.render(params)?;
                        (rendered.sql, rendered.params)
                    }
                    None => (template.text().to_string(), Vec::new()),
                };
                let sql = format!("{} {}", self.select_all(), fragment);
                session.execute(&sql, &bound).map(Some)
            }
        }
    }

    fn select_all(&self) -> String {
        format!("SELECT * FROM {}", self.table)
    }
}

/// Render rows one per line, columns joined by [`COLUMN_SEPARATOR`]
pub fn rows_to_string(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(COLUMN_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
