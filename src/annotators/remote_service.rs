use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::annotators::{AnnotationOptions, VariantAnnotator};
use crate::data_types::annotation::Annotation;
use crate::data_types::variants::Variant;

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned an error: {0}")]
    Service(String),
    #[error("unable to decode service response: {0}")]
    Decode(#[from] serde_json::Error)
}

/// The annotations a service returned for one submitted variant
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationResult {
    /// The service's id for the submitted variant
    #[serde(default)]
    pub id: String,
    /// Candidate annotations; only the first is used
    #[serde(default, alias = "result")]
    pub results: Vec<Annotation>
}

/// Client for a remote annotation service.
/// Result `i` of the response always belongs to variant `i` of the request.
pub trait RemoteAnnotationClient: Send + Sync {
    fn annotate_batch(&self, variants: &[Variant], options: &AnnotationOptions) -> Result<Vec<AnnotationResult>, RemoteError>;
}

/// Stage that fetches annotations from a remote service and merges them into the batch
pub struct RemoteServiceAnnotator {
    client: Arc<dyn RemoteAnnotationClient>,
    options: AnnotationOptions
}

impl RemoteServiceAnnotator {
    pub fn new(client: Arc<dyn RemoteAnnotationClient>, options: AnnotationOptions) -> Self {
        Self { client, options }
    }
}

impl VariantAnnotator for RemoteServiceAnnotator {
    fn name(&self) -> &str {
        "remote_service"
    }

    fn open(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn run(&mut self, variants: &mut [Variant]) {
        debug!("Annotating batch of {} variants via remote service", variants.len());
        let response = match self.client.annotate_batch(variants, &self.options) {
            Ok(r) => r,
            Err(e) => {
                warn!("Remote annotation of {} variants failed, batch left unannotated: {e}", variants.len());
                return;
            }
        };
        if response.len() != variants.len() {
            warn!("Remote service returned {} results for {} variants", response.len(), variants.len());
        }

        for (variant, result) in variants.iter_mut().zip(response.into_iter()) {
            let AnnotationResult { id, results } = result;
            match results.into_iter().next() {
                Some(annotation) => variant.attach_annotation(annotation),
                None => warn!("Empty result for '{id}'")
            }
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
