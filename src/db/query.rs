use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};
use tracing::debug;

use crate::auth::FacilityScope;
use crate::error::AppError;

pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Paginator envelope returned by every list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub per_page: i64,
    pub current_page: i64,
    pub last_page: i64,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, request: PageRequest) -> Self {
        let last_page = ((total + request.per_page - 1) / request.per_page).max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = request.offset() + 1;
            (Some(from), Some(from + data.len() as i64 - 1))
        };

        Self {
            data,
            total,
            per_page: request.per_page,
            current_page: request.page,
            last_page,
            from,
            to,
        }
    }

    /// Swaps the rows for `data`, keeping the paging fields.
    pub fn with_data<U>(self, data: Vec<U>) -> Page<U> {
        Page {
            data,
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub descending: bool,
}

impl SortSpec {
    /// Resolves a client supplied sort key against a whitelist of
    /// `(api name, column)` pairs. Unknown keys fall back to `default`.
    pub fn resolve(
        requested: Option<&str>,
        direction: Option<&str>,
        allowed: &[(&str, &'static str)],
        default: &'static str,
    ) -> Self {
        let column = requested
            .and_then(|name| {
                allowed
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, column)| *column)
            })
            .unwrap_or(default);

        let descending = !matches!(direction.map(str::to_ascii_lowercase).as_deref(), Some("asc"));

        Self { column, descending }
    }
}

/// Resolved list parameters shared by all repositories.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub page: PageRequest,
    pub sort: SortSpec,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Param {
    Int(i64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<NaiveDate> for Param {
    fn from(value: NaiveDate) -> Self {
        Param::Date(value)
    }
}

impl From<NaiveDateTime> for Param {
    fn from(value: NaiveDateTime) -> Self {
        Param::DateTime(value)
    }
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(&'static str, Param),
    Gte(&'static str, Param),
    Lte(&'static str, Param),
    In(&'static str, Vec<i64>),
    InSubquery(&'static str, &'static str, Vec<i64>),
    Search(&'static [&'static str], String),
}

pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_param<'a>(qb: &mut QueryBuilder<'a, Sqlite>, param: &Param) {
    match param {
        Param::Int(v) => qb.push_bind(*v),
        Param::Text(v) => qb.push_bind(v.clone()),
        Param::Bool(v) => qb.push_bind(*v),
        Param::Date(v) => qb.push_bind(*v),
        Param::DateTime(v) => qb.push_bind(*v),
    };
}

/// A paginated `SELECT` assembled from whitelisted columns and bound values.
#[derive(Debug, Clone)]
pub struct ListQuery {
    select: &'static str,
    from: &'static str,
    key: &'static str,
    conditions: Vec<Condition>,
}

impl ListQuery {
    pub fn new(select: &'static str, from: &'static str, key: &'static str) -> Self {
        Self {
            select,
            from,
            key,
            conditions: Vec::new(),
        }
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Param>) -> Self {
        self.conditions.push(Condition::Eq(column, value.into()));
        self
    }

    pub fn eq_opt<T: Into<Param>>(self, column: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn gte_opt<T: Into<Param>>(mut self, column: &'static str, value: Option<T>) -> Self {
        if let Some(v) = value {
            self.conditions.push(Condition::Gte(column, v.into()));
        }
        self
    }

    pub fn lte_opt<T: Into<Param>>(mut self, column: &'static str, value: Option<T>) -> Self {
        if let Some(v) = value {
            self.conditions.push(Condition::Lte(column, v.into()));
        }
        self
    }

    pub fn scoped(mut self, column: &'static str, scope: &FacilityScope) -> Self {
        if let FacilityScope::Only(ids) = scope {
            self.conditions.push(Condition::In(column, ids.clone()));
        }
        self
    }

    /// `column IN (<subquery> IN (ids))`, where `subquery` ends with the
    /// column its own filter applies to.
    pub fn in_subquery(mut self, column: &'static str, subquery: &'static str, ids: Vec<i64>) -> Self {
        self.conditions
            .push(Condition::InSubquery(column, subquery, ids));
        self
    }

    pub fn scoped_subquery(
        self,
        column: &'static str,
        subquery: &'static str,
        scope: &FacilityScope,
    ) -> Self {
        match scope {
            FacilityScope::All => self,
            FacilityScope::Only(ids) => self.in_subquery(column, subquery, ids.clone()),
        }
    }

    pub fn search(mut self, columns: &'static [&'static str], term: Option<&str>) -> Self {
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            self.conditions
                .push(Condition::Search(columns, term.to_string()));
        }
        self
    }

    fn push_where<'a>(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        for condition in &self.conditions {
            match condition {
                Condition::Eq(column, param) => {
                    qb.push(format!(" AND {} = ", column));
                    push_param(qb, param);
                }
                Condition::Gte(column, param) => {
                    qb.push(format!(" AND {} >= ", column));
                    push_param(qb, param);
                }
                Condition::Lte(column, param) => {
                    qb.push(format!(" AND {} <= ", column));
                    push_param(qb, param);
                }
                Condition::In(_, ids) if ids.is_empty() => {
                    qb.push(" AND 1 = 0");
                }
                Condition::In(column, ids) => {
                    qb.push(format!(" AND {} IN (", column));
                    let mut separated = qb.separated(", ");
                    for id in ids {
                        separated.push_bind(*id);
                    }
                    separated.push_unseparated(")");
                }
                Condition::InSubquery(_, _, ids) if ids.is_empty() => {
                    qb.push(" AND 1 = 0");
                }
                Condition::InSubquery(column, subquery, ids) => {
                    qb.push(format!(" AND {} IN ({} IN (", column, subquery));
                    let mut separated = qb.separated(", ");
                    for id in ids {
                        separated.push_bind(*id);
                    }
                    separated.push_unseparated("))");
                }
                Condition::Search(columns, term) => {
                    let pattern = like_pattern(term);
                    qb.push(" AND (");
                    for (i, column) in columns.iter().enumerate() {
                        if i > 0 {
                            qb.push(" OR ");
                        }
                        qb.push(format!("{} LIKE ", column));
                        qb.push_bind(pattern.clone());
                        qb.push(" ESCAPE '\\'");
                    }
                    qb.push(")");
                }
            }
        }
    }

    pub fn count_sql(&self) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) FROM {} WHERE 1 = 1",
            self.from
        ));
        self.push_where(&mut qb);
        qb.sql().to_string()
    }

    pub async fn fetch_page<T>(
        self,
        pool: &Pool<Sqlite>,
        request: &ListRequest,
    ) -> Result<Page<T>, AppError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut count_qb =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1 = 1", self.from));
        self.push_where(&mut count_qb);
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::new(format!("{} FROM {} WHERE 1 = 1", self.select, self.from));
        self.push_where(&mut qb);

        let direction = if request.sort.descending { "DESC" } else { "ASC" };
        qb.push(format!(
            " ORDER BY {} {}, {} {}",
            request.sort.column, direction, self.key, direction
        ));
        qb.push(" LIMIT ");
        qb.push_bind(request.page.per_page);
        qb.push(" OFFSET ");
        qb.push_bind(request.page.offset());

        debug!(sql = %qb.sql(), "Running list query");

        let rows = qb.build_query_as::<T>().fetch_all(pool).await?;

        Ok(Page::new(rows, total, request.page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORTABLE: &[(&str, &str)] = &[("name", "f.name"), ("created_at", "f.created_at")];

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(PageRequest::new(None, None, 15), PageRequest { page: 1, per_page: 15 });
        assert_eq!(PageRequest::new(Some(0), Some(1000), 15).per_page, MAX_PER_PAGE);
        assert_eq!(PageRequest::new(Some(-3), Some(0), 15), PageRequest { page: 1, per_page: 1 });
        assert_eq!(PageRequest::new(Some(3), Some(10), 15).offset(), 20);
    }

    #[test]
    fn test_page_envelope_math() {
        let page = Page::new(vec![1, 2, 3], 23, PageRequest { page: 3, per_page: 10 });
        assert_eq!(page.last_page, 3);
        assert_eq!(page.from, Some(21));
        assert_eq!(page.to, Some(23));

        let empty: Page<i32> = Page::new(vec![], 0, PageRequest { page: 1, per_page: 15 });
        assert_eq!(empty.last_page, 1);
        assert_eq!(empty.from, None);
        assert_eq!(empty.to, None);
    }

    #[test]
    fn test_sort_uses_whitelist() {
        let sort = SortSpec::resolve(Some("name"), Some("ASC"), SORTABLE, "f.created_at");
        assert_eq!(sort, SortSpec { column: "f.name", descending: false });

        let sort = SortSpec::resolve(Some("name; DROP TABLE users"), None, SORTABLE, "f.created_at");
        assert_eq!(sort.column, "f.created_at");
        assert!(sort.descending);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("山田"), "%山田%");
        assert_eq!(like_pattern("100%_"), "%100\\%\\_%");
    }

    #[test]
    fn test_conditions_render_placeholders() {
        let query = ListQuery::new("SELECT f.*", "facilities f", "f.id")
            .eq("f.facility_type", "group_home")
            .eq_opt::<i64>("f.capacity", None)
            .scoped("f.id", &FacilityScope::Only(vec![1, 2]))
            .search(&["f.name", "f.address"], Some(" 東京 "));

        let sql = query.count_sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM facilities f WHERE 1 = 1 AND f.facility_type = ? \
             AND f.id IN (?, ?) AND (f.name LIKE ? ESCAPE '\\' OR f.address LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_subquery_condition() {
        let sql = ListQuery::new("SELECT u.*", "users u", "u.id")
            .in_subquery(
                "u.id",
                "SELECT user_id FROM facility_users WHERE facility_id",
                vec![4],
            )
            .count_sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM users u WHERE 1 = 1 AND u.id IN \
             (SELECT user_id FROM facility_users WHERE facility_id IN (?))"
        );
    }

    #[test]
    fn test_empty_scope_matches_nothing() {
        let sql = ListQuery::new("SELECT *", "incidents i", "i.id")
            .scoped("i.facility_id", &FacilityScope::Only(vec![]))
            .count_sql();
        assert!(sql.ends_with("AND 1 = 0"));

        let sql = ListQuery::new("SELECT *", "incidents i", "i.id")
            .scoped("i.facility_id", &FacilityScope::All)
            .count_sql();
        assert!(sql.ends_with("WHERE 1 = 1"));
    }
}
