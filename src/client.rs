//! Client side of the todo API: the HTTP transport and the in-memory view
//! state the terminal interface renders.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use thiserror::Error;

use crate::api::ErrorBody;
use crate::model::{DeletedCount, ListQuery, NewTodo, StatusFilter, Todo, TodoFilter, TodoPatch};

/// Categories offered when creating a todo. The server accepts any label.
pub const CATEGORIES: [&str; 4] = ["General", "Work", "Personal", "Shopping"];

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },
}

/// The operations of the todo API, as seen by the client.
pub trait TodoApi {
    fn list(&self, query: &ListQuery) -> Result<Vec<Todo>, ClientError>;
    fn create(&self, todo: &NewTodo) -> Result<Todo, ClientError>;
    fn update(&self, id: &str, patch: &TodoPatch) -> Result<Todo, ClientError>;
    fn delete(&self, id: &str) -> Result<(), ClientError>;
    fn delete_completed(&self) -> Result<usize, ClientError>;
}

/// [`TodoApi`] over HTTP.
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<HttpApi, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Liveness check against `GET /`.
    pub fn ping(&self) -> Result<(), ClientError> {
        tracing::debug!(url = %self.base_url, "GET /");
        check(self.client.get(self.url("/")).send()?)?;
        Ok(())
    }
}

/// Turn a non-success response into [`ClientError::Api`], keeping the
/// server's message when there is one.
fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .map(|body| body.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

impl TodoApi for HttpApi {
    fn list(&self, query: &ListQuery) -> Result<Vec<Todo>, ClientError> {
        tracing::debug!(?query, "GET /todos");
        let response = self.client.get(self.url("/todos")).query(query).send()?;
        Ok(check(response)?.json()?)
    }

    fn create(&self, todo: &NewTodo) -> Result<Todo, ClientError> {
        tracing::debug!("POST /todos");
        let response = self.client.post(self.url("/todos")).json(todo).send()?;
        Ok(check(response)?.json()?)
    }

    fn update(&self, id: &str, patch: &TodoPatch) -> Result<Todo, ClientError> {
        tracing::debug!(id, "PUT /todos/{{id}}");
        let response = self
            .client
            .put(self.url(&format!("/todos/{}", id)))
            .json(patch)
            .send()?;
        Ok(check(response)?.json()?)
    }

    fn delete(&self, id: &str) -> Result<(), ClientError> {
        tracing::debug!(id, "DELETE /todos/{{id}}");
        let response = self
            .client
            .delete(self.url(&format!("/todos/{}", id)))
            .send()?;
        check(response)?;
        Ok(())
    }

    fn delete_completed(&self) -> Result<usize, ClientError> {
        tracing::debug!("DELETE /todos");
        let response = self.client.delete(self.url("/todos")).send()?;
        let DeletedCount { deleted_count } = check(response)?.json()?;
        Ok(deleted_count)
    }
}

/// Identifies one list request. Only the response to the latest request is
/// applied; older ones are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// What the client shows: the last fetched todos, the active filters and
/// the outcome of the last action.
pub struct TodoApp<A> {
    api: A,
    todos: Vec<Todo>,
    filter: TodoFilter,
    search_input: String,
    loading: bool,
    error: Option<String>,
    latest_fetch: u64,
}

impl<A: TodoApi> TodoApp<A> {
    pub fn new(api: A) -> Self {
        Self::with_filter(api, TodoFilter::default())
    }

    pub fn with_filter(api: A, filter: TodoFilter) -> Self {
        TodoApp {
            api,
            todos: Vec::new(),
            search_input: filter.search.clone().unwrap_or_default(),
            filter,
            loading: false,
            error: None,
            latest_fetch: 0,
        }
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn filter(&self) -> &TodoFilter {
        &self.filter
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// First load of the list.
    pub fn mount(&mut self) {
        self.refresh();
    }

    /// Fetch the list for the current filters and replace the held one.
    pub fn refresh(&mut self) {
        let ticket = self.begin_fetch();
        let result = self.api.list(&ListQuery::from(&self.filter));
        self.finish_fetch(ticket, result);
    }

    /// Start a list request, superseding any request still outstanding.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.latest_fetch += 1;
        self.loading = true;
        FetchTicket(self.latest_fetch)
    }

    /// Apply the response of a list request. Returns false, leaving the state
    /// untouched, when a newer request has been started since.
    pub fn finish_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Todo>, ClientError>,
    ) -> bool {
        if ticket.0 != self.latest_fetch {
            tracing::debug!(?ticket, latest = self.latest_fetch, "dropping stale list response");
            return false;
        }
        self.loading = false;
        match result {
            Ok(todos) => {
                self.todos = todos;
                self.error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load todos");
                self.error = Some(format!(
                    "Failed to load todos, check that the server is running: {}",
                    e
                ));
            }
        }
        true
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        if self.filter.status != status {
            self.filter.status = status;
            self.refresh();
        }
    }

    /// `None` or a blank name shows every category.
    pub fn set_category(&mut self, category: Option<String>) {
        let category = category.filter(|c| !c.trim().is_empty());
        if self.filter.category != category {
            self.filter.category = category;
            self.refresh();
        }
    }

    /// Edit the search text without fetching; see [`TodoApp::search`].
    pub fn set_search_input(&mut self, text: impl Into<String>) {
        self.search_input = text.into();
    }

    /// Commit the search input to the filters and fetch.
    pub fn search(&mut self) {
        self.filter.search = if self.search_input.trim().is_empty() {
            None
        } else {
            Some(self.search_input.clone())
        };
        self.refresh();
    }

    /// Create a todo and show it first. Blank text is ignored. Returns
    /// whether a todo was created.
    pub fn add(&mut self, todo: NewTodo) -> bool {
        if todo.task.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return false;
        }
        match self.api.create(&todo) {
            Ok(created) => {
                self.todos.insert(0, created);
                self.error = None;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to add todo");
                self.error = Some(format!("Could not add todo: {}", e));
                false
            }
        }
    }

    /// Flip the completion of a listed todo.
    pub fn toggle(&mut self, id: &str) {
        let completed = match self.todos.iter().find(|t| t.id == id) {
            Some(todo) => todo.completed,
            None => {
                self.error = Some("Could not update todo: it is not listed".to_string());
                return;
            }
        };
        match self.api.update(id, &TodoPatch::completed(!completed)) {
            Ok(updated) => {
                // Last response wins.
                if let Some(slot) = self.todos.iter_mut().find(|t| t.id == updated.id) {
                    *slot = updated;
                }
                self.error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, id, "failed to update todo");
                self.error = Some(format!("Could not update todo: {}", e));
            }
        }
    }

    pub fn remove(&mut self, id: &str) {
        match self.api.delete(id) {
            Ok(()) => {
                self.todos.retain(|t| t.id != id);
                self.error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, id, "failed to delete todo");
                self.error = Some(format!("Could not delete todo: {}", e));
            }
        }
    }

    /// Delete every completed todo on the server, then reload.
    pub fn clear_completed(&mut self) {
        match self.api.delete_completed() {
            Ok(deleted) => {
                tracing::debug!(deleted, "cleared completed todos");
                self.refresh();
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to clear completed todos");
                self.error = Some(format!("Could not clear completed todos: {}", e));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock;
