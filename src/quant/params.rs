//! 8-bit linear quantization parameters
//!
//! `q = clamp(round(x / scale) + zero_point, qmin, qmax)`, with the float
//! range always widened to include zero so that zero is exactly representable.

use std::fmt;

/// Integer type weights are stored as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightType {
    /// Asymmetric unsigned 8-bit
    #[default]
    QUInt8,
    /// Symmetric signed 8-bit
    QInt8,
}

impl WeightType {
    /// Representable range, optionally shrunk by one bit
    #[must_use]
    pub fn range(self, reduce_range: bool) -> (i32, i32) {
        match (self, reduce_range) {
            (Self::QUInt8, false) => (0, 255),
            (Self::QUInt8, true) => (0, 127),
            (Self::QInt8, false) => (-127, 127),
            (Self::QInt8, true) => (-64, 64),
        }
    }

    #[must_use]
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::QInt8)
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QUInt8 => write!(f, "QUInt8"),
            Self::QInt8 => write!(f, "QInt8"),
        }
    }
}

/// Per-tensor scale and zero point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
    pub qmin: i32,
    pub qmax: i32,
}

impl QuantParams {
    /// Quantize one value
    #[must_use]
    pub fn quantize(&self, x: f32) -> i32 {
        let q = (x / self.scale).round_ties_even() as i32 + self.zero_point;
        q.clamp(self.qmin, self.qmax)
    }

    /// Map a quantized value back to float
    #[cfg(test)]
    pub fn dequantize(&self, q: i32) -> f32 {
        (q - self.zero_point) as f32 * self.scale
    }
}

/// Min-max parameters for `data`
#[must_use]
pub fn compute_params(data: &[f32], weight_type: WeightType, reduce_range: bool) -> QuantParams {
    let (qmin, qmax) = weight_type.range(reduce_range);

    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut rmin = min.min(0.0);
    let mut rmax = max.max(0.0);

    if weight_type.is_symmetric() {
        let absmax = rmin.abs().max(rmax.abs());
        rmin = -absmax;
        rmax = absmax;
    }

    let mut scale = (rmax - rmin) / (qmax - qmin) as f32;
    if !scale.is_finite() || scale < f32::EPSILON {
        scale = 1.0;
    }

    let zero_point = if weight_type.is_symmetric() {
        0
    } else {
        ((qmin as f32 - rmin / scale).round_ties_even() as i32).clamp(qmin, qmax)
    };

    QuantParams {
        scale,
        zero_point,
        qmin,
        qmax,
    }
}

/// Quantized weight values
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedData {
    U8(Vec<u8>),
    I8(Vec<i8>),
}

impl QuantizedData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I8(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Quantize a whole tensor with a single scale
#[must_use]
pub fn quantize_weights(
    data: &[f32],
    weight_type: WeightType,
    reduce_range: bool,
) -> (QuantizedData, QuantParams) {
    let params = compute_params(data, weight_type, reduce_range);
    let quantized = match weight_type {
        WeightType::QUInt8 => {
            QuantizedData::U8(data.iter().map(|&x| params.quantize(x) as u8).collect())
        }
        WeightType::QInt8 => {
            QuantizedData::I8(data.iter().map(|&x| params.quantize(x) as i8).collect())
        }
    };
    (quantized, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_uint8_range_includes_zero() {
        let params = compute_params(&[1.0, 2.0, 3.0], WeightType::QUInt8, false);
        assert_relative_eq!(params.scale, 3.0 / 255.0);
        assert_eq!(params.zero_point, 0);
        assert_eq!(params.quantize(0.0), 0);
        assert_eq!(params.quantize(3.0), 255);
    }

    #[test]
    fn test_uint8_negative_range() {
        let params = compute_params(&[-1.0, 3.0], WeightType::QUInt8, false);
        assert_relative_eq!(params.scale, 4.0 / 255.0);
        assert_eq!(params.zero_point, 64);
        assert_eq!(params.quantize(-1.0), 0);
    }

    #[test]
    fn test_zero_range_uses_unit_scale() {
        let params = compute_params(&[0.0; 8], WeightType::QUInt8, false);
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.zero_point, 0);
    }

    #[test]
    fn test_reduce_range() {
        let params = compute_params(&[0.0, 1.27], WeightType::QUInt8, true);
        assert_eq!(params.qmax, 127);
        assert_relative_eq!(params.scale, 0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_int8_is_symmetric() {
        let params = compute_params(&[-0.5, 2.54], WeightType::QInt8, false);
        assert_eq!(params.zero_point, 0);
        assert_relative_eq!(params.scale, 2.54 / 127.0, epsilon = 1e-6);
        assert_eq!(params.quantize(-2.54), -127);
    }

    #[test]
    fn test_quantize_weights_output_type() {
        let (q, _) = quantize_weights(&[0.1, -0.2], WeightType::QUInt8, false);
        assert!(matches!(q, QuantizedData::U8(ref v) if v.len() == 2));
        let (q, _) = quantize_weights(&[0.1, -0.2], WeightType::QInt8, false);
        assert!(matches!(q, QuantizedData::I8(_)));
    }

    proptest! {
        #[test]
        fn prop_zero_point_in_range(data in prop::collection::vec(-100.0f32..100.0, 1..64)) {
            let params = compute_params(&data, WeightType::QUInt8, false);
            prop_assert!((0..=255).contains(&params.zero_point));
            prop_assert!(params.scale > 0.0);
        }

        #[test]
        fn prop_round_trip_error_within_half_step(data in prop::collection::vec(-10.0f32..10.0, 1..64)) {
            let params = compute_params(&data, WeightType::QUInt8, false);
            for &x in &data {
                let back = params.dequantize(params.quantize(x));
                prop_assert!((back - x).abs() <= params.scale * 0.5 + 1e-4);
            }
        }

        #[test]
        fn prop_zero_is_exact(data in prop::collection::vec(-10.0f32..10.0, 1..64)) {
            let params = compute_params(&data, WeightType::QUInt8, false);
            prop_assert_eq!(params.dequantize(params.quantize(0.0)), 0.0);
        }
    }
}
