use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, DateTime, Duration, DurationRound, NaiveDate, SecondsFormat, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Category given to todos created without one.
pub const DEFAULT_CATEGORY: &str = "General";

const COLUMNS: &str = "id, task, completed, category, due_date, created_at, updated_at";

/// A single todo, saved as an entry in the todo table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub task: String,
    pub completed: bool,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which todos to show according to their completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Completed => "completed",
            StatusFilter::Pending => "pending",
        }
    }

    /// Lenient parse for query strings: anything unknown means "all".
    pub fn from_query(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "completed" => Ok(StatusFilter::Completed),
            "pending" => Ok(StatusFilter::Pending),
            other => Err(format!(
                "unknown status '{}', expected all, completed or pending",
                other
            )),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Criteria for listing todos. `None` means no restriction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoFilter {
    pub status: StatusFilter,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Query string of `GET /todos`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ListQuery {
    pub fn to_filter(&self) -> TodoFilter {
        TodoFilter {
            status: StatusFilter::from_query(self.status.as_deref()),
            category: non_blank(self.category.as_deref()),
            search: non_blank(self.search.as_deref()),
        }
    }
}

impl From<&TodoFilter> for ListQuery {
    fn from(filter: &TodoFilter) -> Self {
        ListQuery {
            status: Some(filter.status.as_str().to_string()),
            search: non_blank(filter.search.as_deref()),
            category: non_blank(filter.category.as_deref()),
        }
    }
}

/// Body of `POST /todos`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl NewTodo {
    pub fn new(task: impl Into<String>) -> Self {
        NewTodo {
            task: Some(task.into()),
            ..NewTodo::default()
        }
    }
}

/// Body of `PUT /todos/{id}`. Only the fields present are changed; a `null`
/// due date removes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<String>>,
}

impl TodoPatch {
    pub fn completed(completed: bool) -> Self {
        TodoPatch {
            completed: Some(completed),
            ..TodoPatch::default()
        }
    }

    /// Apply the present fields to `todo`. Nothing is touched when a field
    /// fails validation.
    pub fn apply(&self, todo: &mut Todo) -> Result<(), StoreError> {
        let task = match &self.task {
            Some(task) => Some(required_text(Some(task))?),
            None => None,
        };
        let due_date = match &self.due_date {
            Some(Some(value)) => Some(parse_due_date(value)?),
            Some(None) => Some(None),
            None => None,
        };

        if let Some(task) = task {
            todo.task = task;
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(category) = &self.category {
            todo.category = category.clone();
        }
        if let Some(due_date) = due_date {
            todo.due_date = due_date;
        }
        Ok(())
    }
}

/// Response of `DELETE /todos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCount {
    pub deleted_count: usize,
}

// Distinguishes an explicit `null` (Some(None)) from an absent field (None).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}

/// Trimmed task text, rejecting missing or blank values.
fn required_text(value: Option<&str>) -> Result<String, StoreError> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(StoreError::Validation("Task is required".to_string())),
    }
}

/// Parse a due date given either as `YYYY-MM-DD` (midnight UTC) or as an
/// RFC 3339 timestamp. A blank value means no due date.
///
/// Only years 0 through 9999 are accepted, the range RFC 3339 can write back.
pub fn parse_due_date(value: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let invalid = || StoreError::Validation(format!("Invalid due date '{}'", value));
    let due = match NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        Some(midnight) => Utc.from_utc_datetime(&midnight),
        None => DateTime::parse_from_rfc3339(value)
            .map(|date| truncate(date.with_timezone(&Utc)))
            .map_err(|_| invalid())?,
    };
    if !(0..=9999).contains(&due.year()) {
        return Err(invalid());
    }
    Ok(Some(due))
}

/// Timestamps are kept with millisecond precision.
fn truncate(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::milliseconds(1))
        .unwrap_or(time)
}

fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

// Fixed width, so text order is chronological order.
fn time_to_sql(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn time_from_sql(index: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Initialize the todo store.
pub fn init_store(db: &Connection) -> Result<(), StoreError> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS todo (
                  id              TEXT PRIMARY KEY NOT NULL,
                  task            TEXT NOT NULL CHECK (length(trim(task)) > 0),
                  completed       INTEGER NOT NULL DEFAULT 0,
                  category        TEXT NOT NULL DEFAULT 'General',
                  due_date        TEXT,
                  created_at      TEXT NOT NULL,
                  updated_at      TEXT NOT NULL
                  );
         CREATE INDEX IF NOT EXISTS todo_created_at ON todo (created_at);",
    )?;
    Ok(())
}

/// Return the todos matching `filter`, most recently created first.
pub fn list(db: &Connection, filter: &TodoFilter) -> Result<Vec<Todo>, StoreError> {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    match filter.status {
        StatusFilter::All => {}
        StatusFilter::Completed => clauses.push("completed = 1"),
        StatusFilter::Pending => clauses.push("completed = 0"),
    }
    if let Some(category) = &filter.category {
        clauses.push("category = ?1");
        args.push(category.clone());
    }

    let mut sql = format!("SELECT {} FROM todo", COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    // rowid breaks ties between todos created in the same millisecond.
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");

    let mut stmt = db.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), todo_from_row)?;

    // SQLite only folds ASCII case, so the text match happens here.
    let needle = filter.search.as_ref().map(|s| s.to_lowercase());
    let mut todos = Vec::new();
    for todo in rows {
        let todo = todo?;
        let matches = match &needle {
            Some(needle) => todo.task.to_lowercase().contains(needle.as_str()),
            None => true,
        };
        if matches {
            todos.push(todo);
        }
    }
    Ok(todos)
}

/// Return the todo with the given identifier, if any.
pub fn find(db: &Connection, id: &str) -> Result<Option<Todo>, StoreError> {
    let todo = db
        .query_row(
            &format!("SELECT {} FROM todo WHERE id = ?1", COLUMNS),
            params![id],
            todo_from_row,
        )
        .optional()?;
    Ok(todo)
}

/// Create a todo. The task text is trimmed and must not be blank; a blank
/// category falls back to [`DEFAULT_CATEGORY`].
pub fn create(db: &Connection, new: &NewTodo) -> Result<Todo, StoreError> {
    let task = required_text(new.task.as_deref())?;
    let category = non_blank(new.category.as_deref()).unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let due_date = match &new.due_date {
        Some(value) => parse_due_date(value)?,
        None => None,
    };

    let created_at = now();
    let todo = Todo {
        id: Uuid::new_v4().to_string(),
        task,
        completed: false,
        category,
        due_date,
        created_at,
        updated_at: created_at,
    };

    db.execute(
        &format!(
            "INSERT INTO todo ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            COLUMNS
        ),
        params![
            todo.id,
            todo.task,
            todo.completed,
            todo.category,
            todo.due_date.as_ref().map(time_to_sql),
            time_to_sql(&todo.created_at),
            time_to_sql(&todo.updated_at),
        ],
    )?;
    Ok(todo)
}

/// Apply a partial update to the todo with the given identifier and return
/// the stored result.
pub fn update(db: &mut Connection, id: &str, patch: &TodoPatch) -> Result<Todo, StoreError> {
    let tx = db.transaction()?;
    let mut todo = find(&tx, id)?.ok_or(StoreError::NotFound)?;
    patch.apply(&mut todo)?;
    todo.updated_at = now();

    tx.execute(
        "UPDATE todo SET task = ?2, completed = ?3, category = ?4, due_date = ?5, updated_at = ?6 WHERE id = ?1",
        params![
            todo.id,
            todo.task,
            todo.completed,
            todo.category,
            todo.due_date.as_ref().map(time_to_sql),
            time_to_sql(&todo.updated_at),
        ],
    )?;
    tx.commit()?;
    Ok(todo)
}

/// Remove a todo from the store.
pub fn delete(db: &Connection, id: &str) -> Result<(), StoreError> {
    let removed = db.execute("DELETE FROM todo WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Remove every completed todo and return how many were removed.
pub fn delete_completed(db: &Connection) -> Result<usize, StoreError> {
    let removed = db.execute("DELETE FROM todo WHERE completed = 1", [])?;
    Ok(removed)
}

/// Return a todo from a row in this order: [id, task, completed,
/// category, due_date, created_at, updated_at]
pub fn todo_from_row(row: &Row) -> rusqlite::Result<Todo> {
    let due_date = match row.get::<_, Option<String>>(4)? {
        Some(value) => Some(time_from_sql(4, value)?),
        None => None,
    };
    let todo = Todo {
        id: row.get(0)?,
        task: row.get(1)?,
        completed: row.get(2)?,
        category: row.get(3)?,
        due_date,
        created_at: time_from_sql(5, row.get(5)?)?,
        updated_at: time_from_sql(6, row.get(6)?)?,
    };
    Ok(todo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store() -> Connection {
        let db = Connection::open_in_memory().unwrap();
        init_store(&db).unwrap();
        db
    }

    fn add(db: &Connection, task: &str) -> Todo {
        create(db, &NewTodo::new(task)).unwrap()
    }

    fn all(db: &Connection) -> Vec<Todo> {
        list(db, &TodoFilter::default()).unwrap()
    }

    #[test]
    fn create_trims_text_and_applies_defaults() {
        let db = store();
        let todo = add(&db, "  Buy milk \n");

        assert_eq!(todo.task, "Buy milk");
        assert!(!todo.completed);
        assert_eq!(todo.category, DEFAULT_CATEGORY);
        assert_eq!(todo.due_date, None);
        assert_eq!(todo.created_at, todo.updated_at);
        assert_eq!(find(&db, &todo.id).unwrap(), Some(todo));
    }

    #[test]
    fn create_generates_distinct_identifiers() {
        let db = store();
        let first = add(&db, "one");
        let second = add(&db, "two");
        assert_ne!(first.id, second.id);
    }

    #[rstest]
    #[case(Some(""))]
    #[case(Some("   "))]
    #[case(Some("\t\n"))]
    #[case(None)]
    fn create_rejects_blank_text(#[case] task: Option<&str>) {
        let db = store();
        let new = NewTodo {
            task: task.map(String::from),
            ..NewTodo::default()
        };

        let result = create(&db, &new);
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(all(&db).is_empty());
    }

    #[test]
    fn create_keeps_category_and_due_date() {
        let db = store();
        let new = NewTodo {
            task: Some("Report".to_string()),
            category: Some("Work".to_string()),
            due_date: Some("2030-02-01".to_string()),
        };
        let todo = create(&db, &new).unwrap();

        assert_eq!(todo.category, "Work");
        assert_eq!(
            todo.due_date,
            Some(Utc.with_ymd_and_hms(2030, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(find(&db, &todo.id).unwrap().unwrap().due_date, todo.due_date);
    }

    #[rstest]
    #[case("", None)]
    #[case("2030-02-01", Some(Utc.with_ymd_and_hms(2030, 2, 1, 0, 0, 0).unwrap()))]
    #[case("2030-02-01T10:30:00+02:00", Some(Utc.with_ymd_and_hms(2030, 2, 1, 8, 30, 0).unwrap()))]
    #[case("9999-12-31", Some(Utc.with_ymd_and_hms(9999, 12, 31, 0, 0, 0).unwrap()))]
    fn due_dates_parse(#[case] input: &str, #[case] expected: Option<DateTime<Utc>>) {
        assert_eq!(parse_due_date(input).unwrap(), expected);
    }

    #[rstest]
    #[case("tomorrow")]
    #[case("2030-13-01")]
    #[case("+10000-01-01")]
    #[case("-0001-01-01")]
    #[case("0000-01-01T00:00:00+01:00")]
    fn invalid_due_dates_are_rejected(#[case] input: &str) {
        let db = store();
        let new = NewTodo {
            task: Some("Report".to_string()),
            due_date: Some(input.to_string()),
            ..NewTodo::default()
        };
        assert!(matches!(create(&db, &new), Err(StoreError::Validation(_))));
        assert!(all(&db).is_empty());
    }

    #[test]
    fn updating_completed_leaves_other_fields() {
        let mut db = store();
        let new = NewTodo {
            task: Some("Report".to_string()),
            category: Some("Work".to_string()),
            due_date: Some("2030-02-01".to_string()),
        };
        let todo = create(&db, &new).unwrap();

        let updated = update(&mut db, &todo.id, &TodoPatch::completed(true)).unwrap();
        assert!(updated.completed);
        assert_eq!(updated.task, todo.task);
        assert_eq!(updated.category, todo.category);
        assert_eq!(updated.due_date, todo.due_date);
        assert_eq!(updated.created_at, todo.created_at);
        assert!(updated.updated_at >= todo.updated_at);
        assert_eq!(find(&db, &todo.id).unwrap(), Some(updated));
    }

    #[test]
    fn updating_text_leaves_completion() {
        let mut db = store();
        let todo = add(&db, "Report");
        update(&mut db, &todo.id, &TodoPatch::completed(true)).unwrap();

        let patch = TodoPatch {
            task: Some("  Final report ".to_string()),
            ..TodoPatch::default()
        };
        let updated = update(&mut db, &todo.id, &patch).unwrap();
        assert_eq!(updated.task, "Final report");
        assert!(updated.completed);
        assert_eq!(updated.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn blank_text_update_changes_nothing() {
        let mut db = store();
        let todo = add(&db, "Report");
        let patch = TodoPatch {
            task: Some("   ".to_string()),
            completed: Some(true),
            ..TodoPatch::default()
        };

        assert!(matches!(
            update(&mut db, &todo.id, &patch),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(find(&db, &todo.id).unwrap(), Some(todo));
    }

    #[test]
    fn null_due_date_clears_it() {
        let mut db = store();
        let new = NewTodo {
            task: Some("Report".to_string()),
            due_date: Some("2030-02-01".to_string()),
            ..NewTodo::default()
        };
        let todo = create(&db, &new).unwrap();

        let patch: TodoPatch = serde_json::from_str(r#"{"dueDate": null}"#).unwrap();
        let updated = update(&mut db, &todo.id, &patch).unwrap();
        assert_eq!(updated.due_date, None);

        let patch: TodoPatch = serde_json::from_str(r#"{"category": "Home"}"#).unwrap();
        assert_eq!(patch.due_date, None);
    }

    #[test]
    fn unknown_identifiers_are_not_found() {
        let mut db = store();
        add(&db, "Report");

        assert!(matches!(
            update(&mut db, "missing", &TodoPatch::completed(true)),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(delete(&db, "missing"), Err(StoreError::NotFound)));
        assert_eq!(all(&db).len(), 1);
    }

    #[test]
    fn delete_removes_one_record() {
        let db = store();
        let keep = add(&db, "keep");
        let gone = add(&db, "gone");

        delete(&db, &gone.id).unwrap();
        assert_eq!(all(&db), vec![keep]);
    }

    #[test]
    fn list_is_newest_first() {
        let db = store();
        let first = add(&db, "first");
        let second = add(&db, "second");
        let third = add(&db, "third");

        let ids: Vec<String> = all(&db).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn status_filters_partition_the_list() {
        let mut db = store();
        let done = add(&db, "done");
        let pending = add(&db, "pending");
        update(&mut db, &done.id, &TodoPatch::completed(true)).unwrap();

        let completed = list(
            &db,
            &TodoFilter {
                status: StatusFilter::Completed,
                ..TodoFilter::default()
            },
        )
        .unwrap();
        let open = list(
            &db,
            &TodoFilter {
                status: StatusFilter::Pending,
                ..TodoFilter::default()
            },
        )
        .unwrap();

        assert_eq!(completed.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&done.id]);
        assert_eq!(open.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&pending.id]);
        assert_eq!(all(&db).len(), 2);
    }

    #[test]
    fn category_and_search_filters() {
        let db = store();
        create(
            &db,
            &NewTodo {
                task: Some("Buy MILK".to_string()),
                category: Some("Shopping".to_string()),
                ..NewTodo::default()
            },
        )
        .unwrap();
        add(&db, "Call the milkman");
        add(&db, "Write report");

        let search = |text: &str| TodoFilter {
            search: Some(text.to_string()),
            ..TodoFilter::default()
        };
        assert_eq!(list(&db, &search("milk")).unwrap().len(), 2);
        assert_eq!(list(&db, &search("REPORT")).unwrap().len(), 1);
        assert!(list(&db, &search("nothing")).unwrap().is_empty());

        let shopping = TodoFilter {
            category: Some("Shopping".to_string()),
            search: Some("milk".to_string()),
            ..TodoFilter::default()
        };
        let found = list(&db, &shopping).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].task, "Buy MILK");
    }

    #[test]
    fn delete_completed_counts_and_is_repeatable() {
        let mut db = store();
        for task in ["a", "b", "c"] {
            let todo = add(&db, task);
            if task != "b" {
                update(&mut db, &todo.id, &TodoPatch::completed(true)).unwrap();
            }
        }

        assert_eq!(delete_completed(&db).unwrap(), 2);
        assert_eq!(delete_completed(&db).unwrap(), 0);
        let left = all(&db);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].task, "b");
    }

    #[rstest]
    #[case(None, StatusFilter::All)]
    #[case(Some("completed"), StatusFilter::Completed)]
    #[case(Some("Pending"), StatusFilter::Pending)]
    #[case(Some("bogus"), StatusFilter::All)]
    fn status_query_is_lenient(#[case] value: Option<&str>, #[case] expected: StatusFilter) {
        assert_eq!(StatusFilter::from_query(value), expected);
    }

    #[test]
    fn blank_query_parameters_do_not_filter() {
        let query = ListQuery {
            status: Some("pending".to_string()),
            search: Some("  ".to_string()),
            category: Some(String::new()),
        };
        assert_eq!(
            query.to_filter(),
            TodoFilter {
                status: StatusFilter::Pending,
                category: None,
                search: None,
            }
        );
    }
}
