use std::sync::Arc;

use crate::observability::Metrics;
use crate::pipeline::ExportPipeline;
use crate::scheduler::ScheduleCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ExportPipeline>,
    pub scheduler: Arc<ScheduleCoordinator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(pipeline: Arc<ExportPipeline>, scheduler: Arc<ScheduleCoordinator>) -> Self {
        let metrics = pipeline.metrics().clone();
        Self {
            pipeline,
            scheduler,
            metrics,
        }
    }
}
