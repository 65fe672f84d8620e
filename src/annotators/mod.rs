/*!
# Annotators
Each annotator is one stage in a per-worker chain.
Stages see the whole batch in order and may only enrich records in place; they never add, drop, or reorder them.

A stage that fails to open is skipped for the rest of the run unless it is mandatory, in which case the run stops.
Errors while running a stage are logged by the stage itself and leave the batch untouched.
*/
use anyhow::bail;
use log::{debug, warn};

use crate::data_types::variants::Variant;

/// INFO attributes from custom annotation files
pub mod custom_file;
/// Local consequence calculation
pub mod local_calculator;
/// Population frequencies from a side store
pub mod population_frequency;
/// Remote annotation service client stage
pub mod remote_service;
/// HTTP client for a remote annotation service
pub mod rest_client;

/// Options shared by every stage in a chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationOptions {
    /// If true, side-store hits are applied regardless of haplotype phase
    pub ignore_phase: bool
}

/// One stage of the annotation chain
pub trait VariantAnnotator: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Mandatory stages abort the run if they cannot open
    fn is_mandatory(&self) -> bool {
        false
    }

    /// Acquires any resources; calling twice must be harmless
    fn open(&mut self) -> anyhow::Result<()>;

    /// Enriches the batch in place
    fn run(&mut self, variants: &mut [Variant]);

    /// Releases resources; calling twice must be harmless
    fn close(&mut self) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StageState {
    Closed,
    Open,
    /// failed to open, skipped for the rest of the run
    Unavailable
}

struct ChainStage {
    annotator: Box<dyn VariantAnnotator>,
    state: StageState
}

/// An ordered list of annotator stages owned by one worker
pub struct AnnotatorChain {
    stages: Vec<ChainStage>
}

impl AnnotatorChain {
    /// Builds a chain; stages run in the given order
    pub fn new(annotators: Vec<Box<dyn VariantAnnotator>>) -> Self {
        let stages = annotators.into_iter()
            .map(|annotator| ChainStage { annotator, state: StageState::Closed })
            .collect();
        Self { stages }
    }

    /// Opens every stage that isn't already open.
    /// # Errors
    /// * if a mandatory stage fails to open
    pub fn open(&mut self) -> anyhow::Result<()> {
        for stage in self.stages.iter_mut() {
            if stage.state != StageState::Closed {
                continue;
            }
            match stage.annotator.open() {
                Ok(()) => {
                    debug!("Opened annotator {}", stage.annotator.name());
                    stage.state = StageState::Open;
                },
                Err(e) if stage.annotator.is_mandatory() => {
                    bail!("Mandatory annotator {} failed to open: {e:#}", stage.annotator.name());
                },
                Err(e) => {
                    warn!("Annotator {} failed to open and will be skipped: {e:#}", stage.annotator.name());
                    stage.state = StageState::Unavailable;
                }
            }
        }
        Ok(())
    }

    /// Runs every open stage over the batch in order
    pub fn run(&mut self, variants: &mut [Variant]) {
        if variants.is_empty() {
            return;
        }
        for stage in self.stages.iter_mut().filter(|s| s.state == StageState::Open) {
            stage.annotator.run(variants);
        }
    }

    /// Closes every open stage; close failures are logged and counted
    pub fn close(&mut self) -> usize {
        let mut failures = 0;
        for stage in self.stages.iter_mut() {
            if stage.state != StageState::Open {
                continue;
            }
            if let Err(e) = stage.annotator.close() {
                warn!("Error while closing annotator {}: {e:#}", stage.annotator.name());
                failures += 1;
            }
            stage.state = StageState::Closed;
        }
        failures
    }

    /// Names of the stages that are currently open
    pub fn active_stages(&self) -> Vec<&str> {
        self.stages.iter()
            .filter(|s| s.state == StageState::Open)
            .map(|s| s.annotator.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    use crate::data_types::annotation::{AdditionalAttribute, Annotation};

    /// Records its calls and tags each variant
    struct MockStage {
        name: String,
        mandatory: bool,
        fail_open: bool,
        log: Arc<Mutex<Vec<String>>>
    }

    impl MockStage {
        fn boxed(name: &str, mandatory: bool, fail_open: bool, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn VariantAnnotator> {
            Box::new(Self { name: name.to_string(), mandatory, fail_open, log: log.clone() })
        }
    }

    impl VariantAnnotator for MockStage {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_mandatory(&self) -> bool {
            self.mandatory
        }

        fn open(&mut self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("open {}", self.name));
            if self.fail_open {
                Err(anyhow!("missing resource"))
            } else {
                Ok(())
            }
        }

        fn run(&mut self, variants: &mut [Variant]) {
            self.log.lock().unwrap().push(format!("run {}", self.name));
            for v in variants.iter_mut() {
                let mut annotation = Annotation::default();
                annotation.add_attribute(&self.name, AdditionalAttribute::default());
                v.attach_annotation(annotation);
            }
        }

        fn close(&mut self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("close {}", self.name));
            Ok(())
        }
    }

    fn batch() -> Vec<Variant> {
        vec![
            Variant::new("1".to_string(), 1, "A".to_string(), "C".to_string()).unwrap(),
            Variant::new("1".to_string(), 2, "A".to_string(), "G".to_string()).unwrap()
        ]
    }

    #[test]
    fn test_chain_order_and_skip() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut chain = AnnotatorChain::new(vec![
            MockStage::boxed("first", false, false, &log),
            MockStage::boxed("broken", false, true, &log),
            MockStage::boxed("second", false, false, &log)
        ]);
        chain.open().unwrap();
        // idempotent
        chain.open().unwrap();
        assert_eq!(chain.active_stages(), vec!["first", "second"]);

        let mut variants = batch();
        chain.run(&mut variants);
        assert_eq!(chain.close(), 0);
        assert_eq!(chain.close(), 0);

        let attributes = variants[1].annotation().unwrap().additional_attributes.as_ref().unwrap();
        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(*log.lock().unwrap(), vec![
            "open first", "open broken", "open second",
            "run first", "run second",
            "close first", "close second"
        ]);
    }

    #[test]
    fn test_mandatory_failure() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut chain = AnnotatorChain::new(vec![
            MockStage::boxed("required", true, true, &log)
        ]);
        let error = chain.open().unwrap_err();
        assert!(error.to_string().contains("required"));
    }

    /// Opens fine but can't release its resources
    struct StuckStage;

    impl VariantAnnotator for StuckStage {
        fn name(&self) -> &str {
            "stuck"
        }

        fn open(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn run(&mut self, _variants: &mut [Variant]) {}

        fn close(&mut self) -> anyhow::Result<()> {
            Err(anyhow!("connection still in use"))
        }
    }

    #[test]
    fn test_close_failures_counted() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut chain = AnnotatorChain::new(vec![
            Box::new(StuckStage),
            MockStage::boxed("first", false, false, &log)
        ]);
        chain.open().unwrap();
        assert_eq!(chain.close(), 1);
        // the failed stage still counts as closed
        assert_eq!(chain.close(), 0);
        assert!(chain.active_stages().is_empty());
        assert_eq!(log.lock().unwrap().last().map(|s| s.as_str()), Some("close first"));
    }

    #[test]
    fn test_empty_batch_not_run() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut chain = AnnotatorChain::new(vec![MockStage::boxed("first", false, false, &log)]);
        chain.open().unwrap();
        chain.run(&mut []);
        assert_eq!(*log.lock().unwrap(), vec!["open first"]);
    }
}
