//! Services on top of the SQL builder: generic CRUD, validation, forum rules and fake data.

mod crud;
mod forum;
pub mod seed;
mod validation;

pub use crud::{column_filters, parse_id, parse_sort, CrudService, ListParams, Page, DEFAULT_LIMIT, MAX_LIMIT};
pub use forum::{ForumService, VoteAction, VoteToggle};
pub use validation::{strip_spaces, writable_body, RequestValidator};
