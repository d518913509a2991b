// Classification metrics for the test split. A confusion matrix built from true and predicted
// labels gives per-class precision/recall/F1/support and the micro, macro and weighted averages,
// laid out like an sklearn classification report.

use crate::error::{Error, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

pub const MICRO_AVG: &str = "micro avg";
pub const MACRO_AVG: &str = "macro avg";
pub const WEIGHTED_AVG: &str = "weighted avg";

/// Confusion matrix: `matrix[true][predicted]` counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[usize], y_pred: &[usize], num_classes: usize) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }

        let mut matrix = vec![vec![0; num_classes]; num_classes];
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            for label in [truth, pred] {
                if label >= num_classes {
                    return Err(Error::InvalidLabel { label, num_classes });
                }
            }
            matrix[truth][pred] += 1;
        }
        Ok(Self { matrix })
    }

    pub fn num_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn get(&self, truth: usize, pred: usize) -> usize {
        self.matrix[truth][pred]
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    /// Predicted as `class` but labelled otherwise.
    pub fn false_positives(&self, class: usize) -> usize {
        (0..self.num_classes())
            .filter(|&truth| truth != class)
            .map(|truth| self.matrix[truth][class])
            .sum()
    }

    /// Labelled `class` but predicted otherwise.
    pub fn false_negatives(&self, class: usize) -> usize {
        (0..self.num_classes())
            .filter(|&pred| pred != class)
            .map(|pred| self.matrix[class][pred])
            .sum()
    }

    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes()).map(|class| self.matrix[class][class]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize, support: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Self {
            precision,
            recall,
            f1_score: f1(precision, recall),
            support,
        }
    }
}

/// Per-class rows in label order, followed by the three averages.
#[derive(Clone, Debug)]
pub struct ClassificationReport {
    pub classes: Vec<(String, ClassMetrics)>,
    pub accuracy: f64,
    pub micro_avg: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    /// Looks up a class name or one of the average keys.
    pub fn get(&self, key: &str) -> Option<&ClassMetrics> {
        self.entries()
            .find(|(name, _)| *name == key)
            .map(|(_, metrics)| metrics)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ClassMetrics)> {
        self.classes
            .iter()
            .map(|(name, metrics)| (name.as_str(), metrics))
            .chain([
                (MICRO_AVG, &self.micro_avg),
                (MACRO_AVG, &self.macro_avg),
                (WEIGHTED_AVG, &self.weighted_avg),
            ])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for ClassificationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len() + 4))?;
        for (name, metrics) in self.entries() {
            map.serialize_entry(name, metrics)?;
        }
        map.serialize_entry("accuracy", &self.accuracy)?;
        map.end()
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries()
            .map(|(name, _)| name.chars().count())
            .max()
            .unwrap_or(0);

        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (name, m) in self.entries() {
            if name == MICRO_AVG {
                writeln!(f)?;
            }
            writeln!(
                f,
                "{name:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        writeln!(f)?;
        write!(f, "{:>width$} {:>10.4}", "accuracy", self.accuracy)
    }
}

/// Builds the report for `label_names.len()` classes. Averages run over every class of the schema.
pub fn evaluate(
    y_true: &[usize],
    y_pred: &[usize],
    label_names: &[String],
) -> Result<ClassificationReport> {
    let confusion = ConfusionMatrix::from_labels(y_true, y_pred, label_names.len())?;

    let classes: Vec<(String, ClassMetrics)> = label_names
        .iter()
        .enumerate()
        .map(|(class, name)| {
            let metrics = ClassMetrics::from_counts(
                confusion.true_positives(class),
                confusion.false_positives(class),
                confusion.false_negatives(class),
                confusion.support(class),
            );
            (name.clone(), metrics)
        })
        .collect();

    let total = confusion.total();
    let num_classes = classes.len().max(1) as f64;

    let tp: usize = (0..label_names.len()).map(|c| confusion.true_positives(c)).sum();
    let fp: usize = (0..label_names.len()).map(|c| confusion.false_positives(c)).sum();
    let fn_: usize = (0..label_names.len()).map(|c| confusion.false_negatives(c)).sum();
    let micro_avg = ClassMetrics::from_counts(tp, fp, fn_, total);

    let mean = |pick: fn(&ClassMetrics) -> f64| {
        classes.iter().map(|(_, m)| pick(m)).sum::<f64>() / num_classes
    };
    let macro_avg = ClassMetrics {
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1_score: mean(|m| m.f1_score),
        support: total,
    };

    let weighted = |pick: fn(&ClassMetrics) -> f64| {
        if total == 0 {
            return 0.0;
        }
        classes
            .iter()
            .map(|(_, m)| pick(m) * m.support as f64)
            .sum::<f64>()
            / total as f64
    };
    let weighted_avg = ClassMetrics {
        precision: weighted(|m| m.precision),
        recall: weighted(|m| m.recall),
        f1_score: weighted(|m| m.f1_score),
        support: total,
    };

    Ok(ClassificationReport {
        classes,
        accuracy: confusion.accuracy(),
        micro_avg,
        macro_avg,
        weighted_avg,
        confusion,
    })
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names() -> Vec<String> {
        ["culture", "diverse", "economy", "politic", "sport"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn one_error_in_five() {
        let report = evaluate(&[4, 0, 0, 4, 0], &[4, 0, 0, 4, 1], &names()).unwrap();

        assert!(close(report.accuracy, 0.8));
        let culture = report.get("culture").unwrap();
        assert!(close(culture.recall, 2.0 / 3.0));
        assert!(close(culture.precision, 1.0));
        assert_eq!(culture.support, 3);
        assert_eq!(report.confusion.get(0, 0), 2);
        assert_eq!(report.confusion.get(0, 1), 1);
        assert_eq!(report.confusion.get(4, 4), 2);

        let diverse = report.get("diverse").unwrap();
        assert_eq!(diverse.precision, 0.0);
        assert_eq!(diverse.f1_score, 0.0);
        assert_eq!(diverse.support, 0);

        let sport = report.get("sport").unwrap();
        assert!(close(sport.f1_score, 1.0));
        assert_eq!(sport.support, 2);
    }

    #[test]
    fn averages_follow_their_definitions() {
        let report = evaluate(&[4, 0, 0, 4, 0], &[4, 0, 0, 4, 1], &names()).unwrap();

        let culture_f1 = 2.0 * (1.0 * (2.0 / 3.0)) / (1.0 + 2.0 / 3.0);
        assert!(close(report.macro_avg.f1_score, (culture_f1 + 1.0) / 5.0));
        assert!(close(report.weighted_avg.recall, (3.0 * (2.0 / 3.0) + 2.0) / 5.0));
        assert!(close(report.micro_avg.precision, 0.8));
        assert_eq!(report.macro_avg.support, 5);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(matches!(
            evaluate(&[0, 1], &[0], &names()),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn rejects_labels_outside_schema() {
        assert!(matches!(
            evaluate(&[0], &[9], &names()),
            Err(Error::InvalidLabel { label: 9, .. })
        ));
    }

    #[test]
    fn empty_input_reports_zeros() {
        let report = evaluate(&[], &[], &names()).unwrap();
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.weighted_avg.f1_score, 0.0);
    }

    #[test]
    fn json_uses_report_keys_in_order() {
        let report = evaluate(&[0, 1], &[0, 1], &names()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["culture"]["f1-score"], 1.0);
        assert_eq!(json["weighted avg"]["support"], 2);
        assert_eq!(json["accuracy"], 1.0);
        let text = report.to_json().unwrap();
        assert!(text.find("culture") < text.find("macro avg"));
    }

    #[test]
    fn table_lists_every_entry() {
        let table = evaluate(&[0, 4], &[0, 4], &names()).unwrap().to_string();
        for key in ["culture", "sport", MICRO_AVG, MACRO_AVG, WEIGHTED_AVG, "accuracy"] {
            assert!(table.contains(key), "missing {key} in\n{table}");
        }
    }

    proptest! {
        #[test]
        fn micro_average_equals_accuracy(pairs in prop::collection::vec((0usize..5, 0usize..5), 1..200)) {
            let (y_true, y_pred): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
            let report = evaluate(&y_true, &y_pred, &names()).unwrap();

            let direct = y_true.iter().zip(&y_pred).filter(|(t, p)| t == p).count() as f64
                / y_true.len() as f64;

            prop_assert!(close(report.accuracy, direct));
            prop_assert!(close(report.micro_avg.precision, direct));
            prop_assert!(close(report.micro_avg.recall, direct));
            prop_assert!(close(report.micro_avg.f1_score, direct));
        }
    }
}
