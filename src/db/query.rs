//! Advanced piece query shared by interactive filtering and reporting.
//!
//! [`ReportCriteria`] carries every optional filter plus the requested order.
//! [`PieceQuery`] turns it into a single SQL statement in one pass: each
//! supplied criterion contributes exactly one predicate and one bound
//! parameter, absent criteria contribute nothing. Values are never spliced
//! into the SQL text; only the fixed predicate fragments and the closed set of
//! sort expressions are.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::connection::format_timestamp;
use crate::db::pieces::piece_from_row;
use crate::error::Result;
use crate::models::ReportEntry;

/// Projection shared by every piece query. Columns 0-5 are the piece itself
/// (see `piece_from_row`), 6 and 7 the resolved user and status names.
const PIECE_PROJECTION: &str = "SELECT p.Code, p.Description, p.UserId, p.StatusId, p.PhotoPath, p.RegisteredAt,
        COALESCE(u.Name, ''), COALESCE(s.Name, '')
     FROM Pieces p
     LEFT JOIN Users u ON u.Id = p.UserId
     LEFT JOIN Statuses s ON s.Id = p.StatusId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Code,
    Description,
    /// Resolved user name; unassigned pieces sort as the empty string.
    User,
    /// Resolved status name; unassigned pieces sort as the empty string.
    Status,
    #[default]
    RegisteredAt,
}

impl SortKey {
    pub const ALL: [Self; 5] = [
        Self::Code,
        Self::Description,
        Self::User,
        Self::Status,
        Self::RegisteredAt,
    ];

    fn expression(self) -> &'static str {
        match self {
            Self::Code => "p.Code",
            Self::Description => "COALESCE(p.Description, '')",
            Self::User => "COALESCE(u.Name, '')",
            Self::Status => "COALESCE(s.Name, '')",
            Self::RegisteredAt => "datetime(p.RegisteredAt)",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Code => "Code",
            Self::Description => "Description",
            Self::User => "User",
            Self::Status => "Status",
            Self::RegisteredAt => "Date",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ascending => "Asc",
            Self::Descending => "Desc",
        }
    }
}

/// Requested ordering. The default is newest registration first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl ReportOrder {
    pub const fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

/// Optional, independently combinable filters. Every supplied criterion must
/// hold for a piece to be returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportCriteria {
    /// Case-sensitive substring of the code. Blank counts as absent.
    pub code_contains: Option<String>,
    /// Case-sensitive substring of the description. Blank counts as absent.
    pub description_contains: Option<String>,
    pub user_id: Option<Uuid>,
    pub status_id: Option<Uuid>,
    /// Inclusive lower bound on the registration time.
    pub registered_from: Option<NaiveDateTime>,
    /// Inclusive upper bound. Callers filtering by day pass [`end_of_day`].
    pub registered_to: Option<NaiveDateTime>,
    pub order: ReportOrder,
}

impl ReportCriteria {
    pub fn code_contains(mut self, code: impl Into<String>) -> Self {
        self.code_contains = Some(code.into());
        self
    }

    pub fn description_contains(mut self, description: impl Into<String>) -> Self {
        self.description_contains = Some(description.into());
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn status(mut self, status_id: Uuid) -> Self {
        self.status_id = Some(status_id);
        self
    }

    pub fn registered_between(
        mut self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Self {
        self.registered_from = from;
        self.registered_to = to;
        self
    }

    pub fn order_by(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.order = ReportOrder::new(key, direction);
        self
    }
}

/// Midnight at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// 23:59:59 on `date`, so an inclusive upper bound covers the whole day.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// SQL text plus positional parameters assembled from a [`ReportCriteria`].
#[derive(Debug)]
pub(crate) struct PieceQuery {
    predicates: Vec<&'static str>,
    params: Vec<Value>,
    order: ReportOrder,
}

impl PieceQuery {
    pub(crate) fn from_criteria(criteria: &ReportCriteria) -> Self {
        let mut query = Self {
            predicates: Vec::new(),
            params: Vec::new(),
            order: criteria.order,
        };

        if let Some(code) = non_blank(criteria.code_contains.as_deref()) {
            query.push("instr(p.Code, ?) > 0", Value::Text(code.to_string()));
        }
        if let Some(description) = non_blank(criteria.description_contains.as_deref()) {
            query.push(
                "instr(COALESCE(p.Description, ''), ?) > 0",
                Value::Text(description.to_string()),
            );
        }
        if let Some(user_id) = criteria.user_id {
            query.push("p.UserId = ?", Value::Text(user_id.to_string()));
        }
        if let Some(status_id) = criteria.status_id {
            query.push("p.StatusId = ?", Value::Text(status_id.to_string()));
        }
        if let Some(from) = criteria.registered_from {
            query.push(
                "datetime(p.RegisteredAt) >= datetime(?)",
                Value::Text(format_timestamp(&from)),
            );
        }
        if let Some(to) = criteria.registered_to {
            query.push(
                "datetime(p.RegisteredAt) <= datetime(?)",
                Value::Text(format_timestamp(&to)),
            );
        }

        query
    }

    fn push(&mut self, predicate: &'static str, param: Value) {
        self.predicates.push(predicate);
        self.params.push(param);
    }

    pub(crate) fn sql(&self) -> String {
        let mut sql = String::from(PIECE_PROJECTION);
        if !self.predicates.is_empty() {
            sql.push_str("\n     WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        // Code is unique, so the secondary key makes the order total.
        sql.push_str(&format!(
            "\n     ORDER BY {} {}, p.Code ASC",
            self.order.key.expression(),
            self.order.direction.keyword()
        ));
        sql
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.params
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Run the report query: the filtered, ordered pieces joined with their user
/// and status names. Read-only.
#[instrument(skip(conn))]
pub fn query_report(conn: &Connection, criteria: &ReportCriteria) -> Result<Vec<ReportEntry>> {
    let query = PieceQuery::from_criteria(criteria);
    let sql = query.sql();
    debug!(predicates = query.predicates.len(), %sql, "running piece query");

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params_from_iter(query.params()), |row| {
            Ok(ReportEntry {
                piece: piece_from_row(row)?,
                user_name: row.get(6)?,
                status_name: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(rows = entries.len(), "piece query finished");
    Ok(entries)
}
