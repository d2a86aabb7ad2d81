// Greedy spatial clustering of contours into motion blobs
//
// Single left-to-right pass: each contour joins the first existing blob whose
// centroid is strictly closer than the threshold, otherwise it starts a new blob.
// No re-clustering happens after a merge moves a blob's centroid.

use super::contours::Contour;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.w).max(other.x + other.w);
        let y2 = (self.y + self.h).max(other.y + other.h);
        BoundingBox { x: x1, y: y1, w: x2 - x1, h: y2 - y1 }
    }
}

/// A group of contours believed to be one moving subject.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionBlob {
    pub bounding_box: BoundingBox,
    pub centroid: (f64, f64),
    pub area: f64,
}

impl MotionBlob {
    fn from_contour(contour: &Contour) -> Self {
        Self {
            bounding_box: BoundingBox { x: contour.x, y: contour.y, w: contour.w, h: contour.h },
            centroid: contour.centroid(),
            area: contour.area,
        }
    }

    /// Absorb a contour: union the boxes, area-weight the centroids.
    fn absorb(&mut self, contour: &Contour) {
        let (cx, cy) = contour.centroid();
        let (gx, gy) = self.centroid;
        let total_area = contour.area + self.area;

        self.centroid = if total_area != 0.0 {
            (
                (cx * contour.area + gx * self.area) / total_area,
                (cy * contour.area + gy * self.area) / total_area,
            )
        } else {
            // Zero-area pairs collapse to the origin
            (0.0, 0.0)
        };
        self.bounding_box = self.bounding_box.union(&BoundingBox {
            x: contour.x,
            y: contour.y,
            w: contour.w,
            h: contour.h,
        });
        self.area = total_area;
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

pub fn cluster_contours(contours: &[Contour], distance_threshold: f64) -> Vec<MotionBlob> {
    let mut blobs: Vec<MotionBlob> = Vec::new();

    for contour in contours {
        let centroid = contour.centroid();
        match blobs
            .iter_mut()
            .find(|blob| distance(centroid, blob.centroid) < distance_threshold)
        {
            Some(blob) => blob.absorb(contour),
            None => blobs.push(MotionBlob::from_contour(contour)),
        }
    }

    blobs
}
