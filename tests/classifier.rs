use arabic_news_bert::model::BertModelConfig;
use arabic_news_bert::{BertClassifier, ClassifierState, Error, FitOptions};
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

type TestBackend = Autodiff<NdArray<f32>>;

const NUM_LABELS: usize = 5;
const SEQ_LEN: usize = 6;

fn tiny_classifier() -> BertClassifier<TestBackend> {
    let config = BertModelConfig::new(32, 8, 1, 2, 16).with_max_position_embeddings(16);
    BertClassifier::from_config(config, NUM_LABELS, NdArrayDevice::Cpu)
        .unwrap()
        .with_options(FitOptions::new().with_learning_rate(1e-3).with_log_interval(1))
}

// [CLS] w1 w2 [SEP] then padding, with a mask to match.
fn rows(n: usize) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let ids = (0..n)
        .map(|i| {
            let word = 4 + (i % 20) as u32;
            let mut row = vec![2, word, word + 1, 3];
            row.resize(SEQ_LEN, 0);
            row
        })
        .collect();
    let mask = (0..n).map(|_| vec![1, 1, 1, 1, 0, 0]).collect();
    (ids, mask)
}

fn labels(n: usize) -> Vec<usize> {
    (0..n).map(|i| i % NUM_LABELS).collect()
}

#[test]
fn fit_moves_state_to_trained_and_accumulates_epochs() {
    let mut classifier = tiny_classifier();
    let (ids, mask) = rows(8);
    assert_eq!(classifier.state(), ClassifierState::Untrained);

    classifier.fit(&ids, &mask, &labels(8), 0, 2, 4).unwrap();
    assert_eq!(classifier.state(), ClassifierState::Trained { epochs: 2 });

    classifier.fit(&ids, &mask, &labels(8), 1, 1, 4).unwrap();
    assert_eq!(classifier.state(), ClassifierState::Trained { epochs: 3 });
}

#[test]
fn predict_is_repeatable_and_in_range() {
    let mut classifier = tiny_classifier();
    let (ids, mask) = rows(10);
    classifier.fit(&ids, &mask, &labels(10), 0, 1, 4).unwrap();

    let first = classifier.predict(&ids, &mask, 0, 3).unwrap();
    let second = classifier.predict(&ids, &mask, 0, 3).unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
    assert!(first.iter().all(|&label| label < NUM_LABELS));
}

#[test]
fn worker_count_does_not_change_prediction_order() {
    let classifier = tiny_classifier();
    let (ids, mask) = rows(17);

    let single = classifier.predict(&ids, &mask, 0, 2).unwrap();
    let parallel = classifier.predict(&ids, &mask, 3, 2).unwrap();

    assert_eq!(single, parallel);
}

#[test]
fn predict_on_no_rows_returns_nothing() {
    let classifier = tiny_classifier();
    assert!(classifier.predict(&[], &[], 2, 4).unwrap().is_empty());
}

#[test]
fn fit_rejects_mask_rows_of_another_length() {
    let mut classifier = tiny_classifier();
    let (ids, mut mask) = rows(4);
    mask[2].pop();

    let result = classifier.fit(&ids, &mask, &labels(4), 0, 1, 2);

    assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    assert_eq!(classifier.state(), ClassifierState::Untrained);
}

#[test]
fn fit_rejects_label_count_mismatch() {
    let mut classifier = tiny_classifier();
    let (ids, mask) = rows(4);

    let result = classifier.fit(&ids, &mask, &labels(3), 0, 1, 2);

    assert!(matches!(result, Err(Error::ShapeMismatch(_))));
}

#[test]
fn fit_rejects_labels_outside_the_head() {
    let mut classifier = tiny_classifier();
    let (ids, mask) = rows(2);

    let result = classifier.fit(&ids, &mask, &[0, NUM_LABELS], 0, 1, 2);

    assert!(matches!(
        result,
        Err(Error::InvalidLabel { label: NUM_LABELS, num_classes: NUM_LABELS })
    ));
}

#[test]
fn predict_rejects_row_count_mismatch() {
    let classifier = tiny_classifier();
    let (ids, mask) = rows(3);

    let result = classifier.predict(&ids, &mask[..2], 0, 2);

    assert!(matches!(result, Err(Error::ShapeMismatch(_))));
}

#[test]
fn zero_batch_size_is_a_config_error() {
    let classifier = tiny_classifier();
    let (ids, mask) = rows(3);

    assert!(matches!(
        classifier.predict(&ids, &mask, 0, 0),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn with_options_replaces_the_defaults() {
    let classifier = tiny_classifier();
    assert_eq!(classifier.options().learning_rate, 1e-3);
    assert_eq!(classifier.options().log_interval, 1);
    assert_eq!(classifier.max_seq_length(), 16);
}

#[test]
fn rows_longer_than_the_position_table_are_rejected() {
    let mut classifier = tiny_classifier();
    let ids = vec![vec![4u32; 20]; 2];
    let mask = vec![vec![1u32; 20]; 2];

    assert!(matches!(
        classifier.predict(&ids, &mask, 0, 2),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        classifier.fit(&ids, &mask, &labels(2), 0, 1, 2),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(classifier.state(), ClassifierState::Untrained);
}

#[test]
fn fit_with_several_workers_trains_every_partition() {
    let mut classifier = tiny_classifier();
    let (ids, mask) = rows(8);

    classifier.fit(&ids, &mask, &labels(8), 3, 1, 4).unwrap();

    assert_eq!(classifier.state(), ClassifierState::Trained { epochs: 1 });
    let predictions = classifier.predict(&ids, &mask, 3, 4).unwrap();
    assert_eq!(predictions.len(), 8);
    assert!(predictions.iter().all(|&label| label < NUM_LABELS));
}
