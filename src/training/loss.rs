//! Binary cross-entropy on logits

use burn::tensor::{activation::log_sigmoid, backend::Backend, Tensor};

/// Mean binary cross-entropy between `logits` and 0/1 `targets`
///
/// Uses `log_sigmoid` on both terms so large logits do not overflow:
/// `-(y * log σ(x) + (1 - y) * log σ(-x))`.
pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_p = log_sigmoid(logits.clone());
    let log_not_p = log_sigmoid(logits.neg());
    let not_targets = targets.ones_like() - targets.clone();

    (targets * log_p + not_targets * log_not_p).neg().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray;

    fn bce(logits: Vec<f32>, targets: Vec<f32>) -> f64 {
        let device = Default::default();
        let n = logits.len();
        let logits = Tensor::<TestBackend, 2>::from_floats(TensorData::new(logits, [n, 1]), &device);
        let targets = Tensor::<TestBackend, 2>::from_floats(TensorData::new(targets, [n, 1]), &device);
        binary_cross_entropy_with_logits(logits, targets).into_scalar().elem()
    }

    #[test]
    fn test_zero_logit_is_ln2() {
        let loss = bce(vec![0.0, 0.0], vec![0.0, 1.0]);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_confident_predictions() {
        assert!(bce(vec![20.0, -20.0], vec![1.0, 0.0]) < 1e-5);
        let wrong = bce(vec![-50.0], vec![1.0]);
        assert!(wrong.is_finite());
        assert!((wrong - 50.0).abs() < 1e-3);
    }
}
