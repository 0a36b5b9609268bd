use std::cell::{Cell, RefCell};

use chrono::{Duration, TimeZone, Utc};

use super::{ClientError, TodoApi};
use crate::model::{ListQuery, NewTodo, StatusFilter, Todo, TodoPatch};

/// Server double keeping todos in memory, newest first.
#[derive(Default)]
pub(crate) struct MockTodoApi {
    pub(crate) todos: RefCell<Vec<Todo>>,
    pub(crate) queries: RefCell<Vec<ListQuery>>,
    pub(crate) failing: Cell<bool>,
    next_id: Cell<u32>,
}

impl MockTodoApi {
    pub(crate) fn with_todos(tasks: &[(&str, bool)]) -> Self {
        let api = MockTodoApi::default();
        for (task, completed) in tasks.iter().rev() {
            let todo = api.create(&NewTodo::new(*task)).unwrap();
            if *completed {
                api.update(&todo.id, &TodoPatch::completed(true)).unwrap();
            }
        }
        api
    }

    fn fail(&self) -> Result<(), ClientError> {
        if self.failing.get() {
            return Err(ClientError::Api {
                status: 500,
                message: "Internal server error".to_string(),
            });
        }
        Ok(())
    }
}

impl TodoApi for MockTodoApi {
    fn list(&self, query: &ListQuery) -> Result<Vec<Todo>, ClientError> {
        self.fail()?;
        self.queries.borrow_mut().push(query.clone());
        let filter = query.to_filter();
        Ok(self
            .todos
            .borrow()
            .iter()
            .filter(|t| match filter.status {
                StatusFilter::All => true,
                StatusFilter::Completed => t.completed,
                StatusFilter::Pending => !t.completed,
            })
            .filter(|t| filter.category.as_ref().map_or(true, |c| &t.category == c))
            .filter(|t| {
                filter
                    .search
                    .as_ref()
                    .map_or(true, |s| t.task.to_lowercase().contains(&s.to_lowercase()))
            })
            .cloned()
            .collect())
    }

    fn create(&self, todo: &NewTodo) -> Result<Todo, ClientError> {
        self.fail()?;
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let created_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
            + Duration::minutes(i64::from(id));
        let created = Todo {
            id: id.to_string(),
            task: todo.task.clone().unwrap_or_default().trim().to_string(),
            completed: false,
            category: todo.category.clone().unwrap_or_else(|| "General".to_string()),
            due_date: None,
            created_at,
            updated_at: created_at,
        };
        self.todos.borrow_mut().insert(0, created.clone());
        Ok(created)
    }

    fn update(&self, id: &str, patch: &TodoPatch) -> Result<Todo, ClientError> {
        self.fail()?;
        let mut todos = self.todos.borrow_mut();
        let todo = todos.iter_mut().find(|t| t.id == id).ok_or(ClientError::Api {
            status: 404,
            message: "Todo not found".to_string(),
        })?;
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        Ok(todo.clone())
    }

    fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.fail()?;
        let mut todos = self.todos.borrow_mut();
        let before = todos.len();
        todos.retain(|t| t.id != id);
        if todos.len() == before {
            return Err(ClientError::Api {
                status: 404,
                message: "Todo not found".to_string(),
            });
        }
        Ok(())
    }

    fn delete_completed(&self) -> Result<usize, ClientError> {
        self.fail()?;
        let mut todos = self.todos.borrow_mut();
        let before = todos.len();
        todos.retain(|t| !t.completed);
        Ok(before - todos.len())
    }
}

