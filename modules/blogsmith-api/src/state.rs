use std::sync::Arc;

use blogsmith_engine::runtime::report::ErrorReporter;
use blogsmith_jobs::JobManager;

pub struct AppState {
    pub manager: Arc<JobManager>,
    pub reporter: Arc<ErrorReporter>,
}
