use anyhow::{anyhow, Result};

use crate::config::{BackendKind, CategorySettings, DetectionSettings};
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::detect::result::CategoryDetections;
use crate::error::DetectionError;
use crate::frame::Frame;

/// Inference parameters shared by every category.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    /// Square network input edge in pixels.
    pub image_size: u32,
    pub confidence: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            image_size: 416,
            confidence: 0.7,
        }
    }
}

struct Category {
    name: String,
    allowed_classes: Vec<u32>,
    backend: Box<dyn DetectorBackend>,
}

/// Detection engine: one backend per category, each filtered to its own
/// class allow-list.
pub struct DetectionEngine {
    categories: Vec<Category>,
    params: DetectionParams,
}

impl DetectionEngine {
    pub fn new(params: DetectionParams) -> Self {
        Self {
            categories: Vec::new(),
            params,
        }
    }

    /// Build the engine described by configuration. Categories whose backend
    /// cannot be constructed in this build are skipped with a warning.
    pub fn from_settings(settings: &DetectionSettings) -> Result<Self> {
        let mut engine = Self::new(DetectionParams {
            image_size: settings.image_size,
            confidence: settings.confidence,
        });
        for category in &settings.categories {
            match build_backend(category, settings.image_size)? {
                Some(backend) => {
                    engine.register_boxed(&category.name, category.classes.clone(), backend)?;
                }
                None => log::warn!(
                    "category '{}' has no usable model - detection disabled for it",
                    category.name
                ),
            }
        }
        if !engine.is_available() {
            log::warn!("no detection models loaded - streaming without detection");
        }
        Ok(engine)
    }

    /// Register a category. Names must be unique.
    pub fn register<B: DetectorBackend + 'static>(
        &mut self,
        name: &str,
        allowed_classes: Vec<u32>,
        backend: B,
    ) -> Result<()> {
        self.register_boxed(name, allowed_classes, Box::new(backend))
    }

    fn register_boxed(
        &mut self,
        name: &str,
        allowed_classes: Vec<u32>,
        mut backend: Box<dyn DetectorBackend>,
    ) -> Result<()> {
        if self.categories.iter().any(|c| c.name == name) {
            return Err(anyhow!("category '{}' registered twice", name));
        }
        backend.warm_up()?;
        log::info!(
            "detection category '{}' using {} backend, classes {:?}",
            name,
            backend.name(),
            allowed_classes
        );
        self.categories.push(Category {
            name: name.to_string(),
            allowed_classes,
            backend,
        });
        Ok(())
    }

    /// True when at least one category can run.
    pub fn is_available(&self) -> bool {
        !self.categories.is_empty()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn params(&self) -> DetectionParams {
        self.params
    }

    /// Run every category on `frame`. Results are in registration order.
    ///
    /// A failure in any category fails the whole frame; the caller treats that
    /// as a frame without detections.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<CategoryDetections>, DetectionError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectionError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        let params = self.params;
        let mut results = Vec::with_capacity(self.categories.len());
        for category in &mut self.categories {
            let detections = category
                .backend
                .infer(frame, params.image_size, params.confidence)
                .map_err(|e| DetectionError::Inference {
                    category: category.name.clone(),
                    reason: format!("{:#}", e),
                })?;
            let allowed = &category.allowed_classes;
            results.push(CategoryDetections {
                category: category.name.clone(),
                detections: detections
                    .into_iter()
                    .filter(|d| allowed.contains(&d.class_id))
                    .collect(),
            });
        }
        Ok(results)
    }
}

fn build_backend(
    category: &CategorySettings,
    image_size: u32,
) -> Result<Option<Box<dyn DetectorBackend>>> {
    match category.backend {
        BackendKind::Stub => Ok(Some(Box::new(StubBackend::from_pattern(
            &category.stub_pattern,
        )))),
        BackendKind::Tract => {
            let Some(model) = category.model.as_ref() else {
                return Ok(None);
            };
            #[cfg(feature = "backend-tract")]
            {
                let backend = crate::detect::backends::TractBackend::new(model, image_size)?;
                Ok(Some(Box::new(backend)))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                let _ = image_size;
                log::warn!(
                    "model {} for '{}' needs the backend-tract feature",
                    model.display(),
                    category.name
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::DetectorBackend;
    use crate::detect::result::{BoundingBox, Detection};

    /// Reports one detection per listed class id.
    struct FixedBackend(Vec<u32>);

    impl DetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn infer(&mut self, _frame: &Frame, _size: u32, _conf: f32) -> Result<Vec<Detection>> {
            Ok(self
                .0
                .iter()
                .map(|&class_id| Detection {
                    class_id,
                    bbox: BoundingBox::new(1.0, 1.0, 4.0, 4.0),
                    confidence: 0.8,
                })
                .collect())
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 8 * 8 * 3], 8, 8, 1).unwrap()
    }

    #[test]
    fn filters_each_category_to_its_allow_list() {
        let mut engine = DetectionEngine::new(DetectionParams::default());
        engine
            .register("restricted-item", vec![0], FixedBackend(vec![0, 2, 0]))
            .unwrap();
        engine
            .register("missing-safety-gear", vec![1], FixedBackend(vec![0, 2]))
            .unwrap();

        let results = engine.detect(&frame()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].category, "restricted-item");
        assert_eq!(results[0].detections.len(), 2);
        assert!(!results[1].is_hit());
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let mut engine = DetectionEngine::new(DetectionParams::default());
        engine.register("a", vec![0], StubBackend::new()).unwrap();
        assert!(engine.register("a", vec![0], StubBackend::new()).is_err());
    }

    #[test]
    fn backend_failure_names_the_category() {
        let mut engine = DetectionEngine::new(DetectionParams::default());
        engine.register("ok", vec![0], StubBackend::always_hit()).unwrap();
        engine.register("broken", vec![0], StubBackend::failing()).unwrap();
        match engine.detect(&frame()) {
            Err(DetectionError::Inference { category, .. }) => assert_eq!(category, "broken"),
            other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn stub_categories_come_from_settings() {
        let settings = DetectionSettings {
            categories: vec![
                CategorySettings {
                    name: "restricted-item".to_string(),
                    backend: BackendKind::Stub,
                    model: None,
                    classes: vec![0],
                    stub_pattern: vec![true],
                },
                CategorySettings {
                    name: "missing-safety-gear".to_string(),
                    backend: BackendKind::Tract,
                    model: None,
                    classes: vec![0],
                    stub_pattern: Vec::new(),
                },
            ],
            ..DetectionSettings::default()
        };
        let engine = DetectionEngine::from_settings(&settings).unwrap();
        assert_eq!(engine.category_names(), vec!["restricted-item".to_string()]);
    }
}
