use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Precision, recall and f1 for both classes of a binary classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
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

fn average(classes: &[ClassMetrics; 2], weight: impl Fn(&ClassMetrics) -> f64) -> ClassMetrics {
    let norm: f64 = classes.iter().map(&weight).sum();
    let mean = |field: fn(&ClassMetrics) -> f64| {
        if norm == 0.0 {
            0.0
        } else {
            classes.iter().map(|c| weight(c) * field(c)).sum::<f64>() / norm
        }
    };
    ClassMetrics {
        precision: mean(|c| c.precision),
        recall: mean(|c| c.recall),
        f1: mean(|c| c.f1),
        support: classes.iter().map(|c| c.support).sum(),
    }
}

impl ClassificationReport {
    /// Labels other than 0 and 1 are counted as 1.
    pub fn new(y_true: &[u8], y_pred: &[u8]) -> Self {
        // confusion[actual][predicted]
        let mut confusion = [[0usize; 2]; 2];
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            confusion[usize::from(actual.min(1))][usize::from(predicted.min(1))] += 1;
        }

        let metrics = |class: usize| {
            let other = 1 - class;
            let hits = confusion[class][class];
            let predicted = hits + confusion[other][class];
            let support = hits + confusion[class][other];
            let precision = ratio(hits, predicted);
            let recall = ratio(hits, support);
            ClassMetrics {
                precision,
                recall,
                f1: f1(precision, recall),
                support,
            }
        };
        let classes = [metrics(0), metrics(1)];

        let total = classes[0].support + classes[1].support;
        let accuracy = ratio(confusion[0][0] + confusion[1][1], total);

        ClassificationReport {
            classes,
            accuracy,
            macro_avg: average(&classes, |_| 1.0),
            weighted_avg: average(&classes, |c| c.support as f64),
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, metrics) in self.classes.iter().enumerate() {
            write_row(f, &label.to_string(), metrics)?;
        }
        writeln!(f)?;
        let total = self.macro_avg.support;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, total
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, label: &str, metrics: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        label, metrics.precision, metrics.recall, metrics.f1, metrics.support
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn computes_per_class_metrics() {
        // 0/0 x3, 0/1 x1, 1/1 x2, 1/0 x2
        let y_true = [0, 0, 0, 0, 1, 1, 1, 1];
        let y_pred = [0, 0, 0, 1, 1, 1, 0, 0];
        let report = ClassificationReport::new(&y_true, &y_pred);

        let negative = report.classes[0];
        assert!(close(negative.precision, 3.0 / 5.0));
        assert!(close(negative.recall, 3.0 / 4.0));
        assert!(close(negative.f1, 2.0 / 3.0));
        assert_eq!(negative.support, 4);

        let positive = report.classes[1];
        assert!(close(positive.precision, 2.0 / 3.0));
        assert!(close(positive.recall, 0.5));
        assert_eq!(positive.support, 4);

        assert!(close(report.accuracy, 5.0 / 8.0));
        assert!(close(
            report.macro_avg.recall,
            (negative.recall + positive.recall) / 2.0
        ));
        assert!(close(report.weighted_avg.recall, report.macro_avg.recall));
        assert_eq!(report.weighted_avg.support, 8);
    }

    #[test]
    fn zero_division_yields_zero() {
        let report = ClassificationReport::new(&[0, 0, 1], &[0, 0, 0]);
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].recall, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
        assert!(close(report.weighted_avg.precision, (2.0 / 3.0) * (2.0 / 3.0)));

        let empty = ClassificationReport::new(&[], &[]);
        assert_eq!(empty.accuracy, 0.0);
        assert_eq!(empty.macro_avg.support, 0);
    }

    #[test]
    fn renders_a_table() {
        let rendered = ClassificationReport::new(&[0, 1, 1, 0], &[0, 1, 0, 0]).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].contains("precision"));
        assert!(lines[2].trim_start().starts_with("0 "));
        assert!(rendered.contains("accuracy"));
        assert!(rendered.contains("weighted avg"));
        assert!(rendered.contains("0.75"));
    }
}
