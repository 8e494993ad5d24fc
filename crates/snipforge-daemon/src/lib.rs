pub mod daemon_manager;
pub mod keyboard_listener;
pub mod permissions;
pub mod pipeline;
pub mod process;
pub mod prompt;

pub use daemon_manager::{
    daemon_status, daemon_worker_entry, run_daemon_worker, start_daemon, stop_daemon,
};
pub use pipeline::{match_queue, ExpansionWorker, MatchSender};
pub use prompt::CommandPresenter;
