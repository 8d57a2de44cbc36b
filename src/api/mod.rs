//! HTTP surface

pub mod rest;

pub use rest::{ApiResponse, RestApi};

use std::sync::Arc;

use crate::analysis::{AnalysisService, LlmProvider};
use crate::records::RecordsService;
use crate::storage::RecordStore;
use crate::vitals::{RotationEngine, RotationScope, VitalsAggregator, VitalsLayout};

/// Wire the services over one store and build the API.
pub fn assemble(
    store: Arc<dyn RecordStore>,
    layout: VitalsLayout,
    scope: RotationScope,
    provider: Arc<dyn LlmProvider>,
) -> RestApi {
    let layout = Arc::new(layout);
    let aggregator = Arc::new(VitalsAggregator::new(Arc::clone(&store), Arc::clone(&layout)));
    let rotation = Arc::new(RotationEngine::new(Arc::clone(&store), Arc::clone(&layout), scope));
    let records = Arc::new(RecordsService::new(
        Arc::clone(&store),
        Arc::clone(&aggregator),
        layout.flat_table(),
    ));
    let analysis = Arc::new(AnalysisService::new(
        Arc::clone(&records),
        Arc::clone(&aggregator),
        provider,
    ));

    RestApi::new(records, rotation, aggregator, analysis)
}
