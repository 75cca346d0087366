mod app;
mod list;
mod start;
mod stop;

pub use app::run_app;
pub use list::run_list;
pub use start::{run_start, run_start_all};
pub use stop::{run_stop, run_stop_all};
