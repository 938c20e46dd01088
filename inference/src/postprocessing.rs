//! Decoding of suppressed model rows into detections

use crate::error::{DetectionError, Result};
use crate::types::{Detection, ScaleRatio, SuppressedTensor};
use std::collections::HashMap;

/// Index and value of the largest score; the first index wins on ties.
///
/// Returns `None` for an empty slice.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut iter = scores.iter().copied().enumerate();
    let first = iter.next()?;
    Some(iter.fold(first, |best, (idx, score)| {
        if score > best.1 {
            (idx, score)
        } else {
            best
        }
    }))
}

/// `[cx, cy, w, h]` -> `[x, y, w, h]` with a top-left origin
pub fn center_to_top_left(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    [cx - w / 2.0, cy - h / 2.0, w, h]
}

/// Undo the square padding. Multiplicative only, since the pad sits bottom/right.
pub fn rescale(bounding: [f32; 4], ratio: ScaleRatio) -> [f32; 4] {
    let [x, y, w, h] = bounding;
    [x * ratio.x, y * ratio.y, w * ratio.x, h * ratio.y]
}

/// Decode one `[cx, cy, w, h, score_0, .., score_n]` row
pub fn decode_row(row: &[f32], ratio: ScaleRatio) -> Result<Detection> {
    if row.len() < 5 {
        return Err(DetectionError::inference(format!(
            "Detection row needs at least 5 values, got {}",
            row.len()
        )));
    }

    let (bbox, scores) = row.split_at(4);
    let (label, probability) = argmax(scores)
        .ok_or_else(|| DetectionError::inference("Detection row has no class scores"))?;

    let bounding = rescale(center_to_top_left(bbox[0], bbox[1], bbox[2], bbox[3]), ratio);

    Ok(Detection::new(label as u32, probability, bounding))
}

/// Decode every surviving row, keeping the suppression model's order
pub fn decode(selected: &SuppressedTensor, ratio: ScaleRatio) -> Result<Vec<Detection>> {
    selected
        .rows()
        .map(|row| match row.as_slice() {
            Some(values) => decode_row(values, ratio),
            None => decode_row(&row.to_vec(), ratio),
        })
        .collect()
}

/// Utility functions for postprocessing
pub mod utils {
    use super::*;

    /// Group detections by class label
    pub fn group_by_class(detections: &[Detection]) -> HashMap<u32, Vec<&Detection>> {
        let mut groups = HashMap::new();

        for detection in detections {
            groups
                .entry(detection.label)
                .or_insert_with(Vec::new)
                .push(detection);
        }

        groups
    }

    /// Clip boxes to a `width` x `height` frame, dropping those left with no area
    pub fn clip_to_frame(detections: Vec<Detection>, width: f32, height: f32) -> Vec<Detection> {
        detections
            .into_iter()
            .filter_map(|det| {
                let [x, y, w, h] = det.bounding;
                let x0 = x.clamp(0.0, width);
                let y0 = y.clamp(0.0, height);
                let x1 = (x + w).clamp(0.0, width);
                let y1 = (y + h).clamp(0.0, height);
                if x1 <= x0 || y1 <= y0 {
                    return None;
                }
                Some(Detection::new(
                    det.label,
                    det.probability,
                    [x0, y0, x1 - x0, y1 - y0],
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, ShapeBuilder};

    #[test]
    fn test_argmax_first_index_wins_ties() {
        assert_eq!(argmax(&[0.5, 0.5, 0.1]), Some((0, 0.5)));
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[0.2]), Some((0, 0.2)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_center_to_top_left() {
        assert_eq!(center_to_top_left(100.0, 50.0, 40.0, 20.0), [80.0, 40.0, 40.0, 20.0]);
    }

    #[test]
    fn test_decode_row_inverts_center_encoding() {
        let (cx, cy, w, h) = (320.0, 180.0, 100.0, 60.0);
        let ratio = ScaleRatio::new(1.0, 1280.0 / 720.0);
        let det = decode_row(&[cx, cy, w, h, 0.1, 0.8, 0.3], ratio).unwrap();

        assert_eq!(det.label, 1);
        assert_abs_diff_eq!(det.probability, 0.8);
        assert_abs_diff_eq!(det.bounding[0], (cx - w / 2.0) * ratio.x, epsilon = 1e-4);
        assert_abs_diff_eq!(det.bounding[1], (cy - h / 2.0) * ratio.y, epsilon = 1e-4);
        assert_abs_diff_eq!(det.bounding[2], w * ratio.x, epsilon = 1e-4);
        assert_abs_diff_eq!(det.bounding[3], h * ratio.y, epsilon = 1e-4);
    }

    #[test]
    fn test_decode_row_tie_resolves_to_lowest_label() {
        let det = decode_row(&[10.0, 10.0, 4.0, 4.0, 0.5, 0.5, 0.1], ScaleRatio::identity()).unwrap();
        assert_eq!(det.label, 0);
        assert_eq!(det.probability, 0.5);
    }

    #[test]
    fn test_decode_row_rejects_short_rows() {
        let err = decode_row(&[1.0, 2.0, 3.0, 4.0], ScaleRatio::identity()).unwrap_err();
        assert!(matches!(err, DetectionError::InferenceError(_)));
    }

    #[test]
    fn test_decode_keeps_model_order() {
        let selected = SuppressedTensor::from_rows(arr2(&[
            [10.0, 10.0, 4.0, 4.0, 0.3, 0.1],
            [20.0, 20.0, 4.0, 4.0, 0.1, 0.9],
        ]));
        let detections = decode(&selected, ScaleRatio::new(2.0, 1.0)).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, 0);
        assert_eq!(detections[1].label, 1);
        assert_eq!(detections[0].bounding, [16.0, 8.0, 8.0, 4.0]);
    }

    #[test]
    fn test_decode_non_contiguous_rows() {
        // column-major storage leaves every row strided
        let rows = arr2(&[
            [10.0, 10.0, 4.0, 4.0, 0.3, 0.1],
            [20.0, 20.0, 4.0, 4.0, 0.1, 0.9],
        ]);
        let mut strided = ndarray::Array2::<f32>::zeros((2, 6).f());
        strided.assign(&rows);
        assert!(strided.row(0).as_slice().is_none());

        let detections = decode(&SuppressedTensor::from_rows(strided), ScaleRatio::identity()).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].label, 1);
        assert_eq!(detections[1].bounding, [18.0, 18.0, 4.0, 4.0]);
    }

    #[test]
    fn test_decode_empty() {
        let selected = SuppressedTensor::from_rows(ndarray::Array2::zeros((0, 84)));
        assert!(decode(&selected, ScaleRatio::identity()).unwrap().is_empty());
    }

    #[test]
    fn test_clip_to_frame() {
        let detections = vec![
            Detection::new(0, 0.9, [-10.0, -10.0, 30.0, 30.0]),
            Detection::new(1, 0.8, [700.0, 10.0, 20.0, 20.0]),
        ];
        let clipped = utils::clip_to_frame(detections, 640.0, 480.0);
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].bounding, [0.0, 0.0, 20.0, 20.0]);
    }

    #[test]
    fn test_group_by_class() {
        let detections = vec![
            Detection::new(3, 0.9, [0.0, 0.0, 1.0, 1.0]),
            Detection::new(3, 0.5, [5.0, 5.0, 1.0, 1.0]),
            Detection::new(7, 0.4, [9.0, 9.0, 1.0, 1.0]),
        ];
        let groups = utils::group_by_class(&detections);
        assert_eq!(groups[&3].len(), 2);
        assert_eq!(groups[&7].len(), 1);
    }
}
