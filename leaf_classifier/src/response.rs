use crate::labels::ClassLabels;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

fn label_for(labels: &ClassLabels, index: usize) -> String {
    match labels.get(index) {
        Some(label) => label.to_string(),
        None => index.to_string(),
    }
}

fn clamp_probability(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

/// Index of the first maximal finite score.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
}

/// Maps a score vector to its top label. `None` when there is no finite
/// score to pick.
pub fn map_scores(scores: &[f32], labels: &ClassLabels) -> Option<Prediction> {
    if scores.len() != labels.len() {
        tracing::warn!(
            "Model produced {} scores for {} class labels",
            scores.len(),
            labels.len()
        );
    }

    let (index, score) = argmax(scores)?;
    Some(Prediction {
        class_label: label_for(labels, index),
        confidence: clamp_probability(score),
    })
}

/// The `k` best labels in descending score order; ties keep index order.
pub fn top_k(scores: &[f32], labels: &ClassLabels, k: usize) -> Vec<LabelScore> {
    let mut ranked: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(k)
        .map(|(index, score)| LabelScore {
            label: label_for(labels, index),
            confidence: clamp_probability(score),
        })
        .collect()
}
