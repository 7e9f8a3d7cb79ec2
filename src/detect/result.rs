/// Axis-aligned box in frame pixel coordinates (corner form).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from center/size form.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp into a `width` x `height` frame.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }

    /// Integer rectangle `(x, y, w, h)` inside a `width` x `height` frame.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> (i32, i32, u32, u32) {
        let clamped = self.clamp(width, height);
        let x = clamped.x1.round();
        let y = clamped.y1.round();
        let w = (clamped.x2.round() - x).max(0.0);
        let h = (clamped.y2.round() - y).max(0.0);
        (x as i32, y as i32, w as u32, h as u32)
    }
}

/// One object found by a detector backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Detections of one category on one frame, already filtered to its allow-list.
#[derive(Clone, Debug, Default)]
pub struct CategoryDetections {
    pub category: String,
    pub detections: Vec<Detection>,
}

impl CategoryDetections {
    pub fn is_hit(&self) -> bool {
        !self.detections.is_empty()
    }
}

/// Greedy class-wise non-maximum suppression. Keeps the highest-confidence box
/// of every overlapping group whose IoU exceeds `iou_threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    'outer: for candidate in detections {
        for kept in &keep {
            if kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
            {
                continue 'outer;
            }
        }
        keep.push(candidate);
    }
    keep
}
