//! Range mapping extensions for floating point numbers.

use num_traits::Float;

// -------------------------------------------------------------------------------------------------

/// Maps numbers from an input range to an output range with linear, exponential or curved
/// transfer functions. Input values outside of the input range clip to the output range bounds.
///
/// Exponential ranges must not cross or touch zero.
pub trait NumberExt: Float {
    /// Linear to linear mapping.
    fn linlin(self, in_min: Self, in_max: Self, out_min: Self, out_max: Self) -> Self {
        if self <= in_min {
            return out_min;
        }
        if self >= in_max {
            return out_max;
        }
        (self - in_min) / (in_max - in_min) * (out_max - out_min) + out_min
    }

    /// Linear to exponential mapping.
    fn linexp(self, in_min: Self, in_max: Self, out_min: Self, out_max: Self) -> Self {
        if self <= in_min {
            return out_min;
        }
        if self >= in_max {
            return out_max;
        }
        (out_max / out_min).powf((self - in_min) / (in_max - in_min)) * out_min
    }

    /// Exponential to linear mapping.
    fn explin(self, in_min: Self, in_max: Self, out_min: Self, out_max: Self) -> Self {
        if self <= in_min {
            return out_min;
        }
        if self >= in_max {
            return out_max;
        }
        (self / in_min).ln() / (in_max / in_min).ln() * (out_max - out_min) + out_min
    }

    /// Exponential to exponential mapping.
    fn expexp(self, in_min: Self, in_max: Self, out_min: Self, out_max: Self) -> Self {
        if self <= in_min {
            return out_min;
        }
        if self >= in_max {
            return out_max;
        }
        (out_max / out_min).powf((self / in_min).ln() / (in_max / in_min).ln()) * out_min
    }

    /// Linear to curved mapping. Positive curve values bend the output towards the end of the
    /// range, negative ones towards the start. A curve of 0 is a linear mapping.
    fn lincurve(
        self,
        in_min: Self,
        in_max: Self,
        out_min: Self,
        out_max: Self,
        curve: Self,
    ) -> Self {
        if self <= in_min {
            return out_min;
        }
        if self >= in_max {
            return out_max;
        }
        let linear_threshold = Self::from(0.001).unwrap_or_else(Self::epsilon);
        if curve.abs() < linear_threshold {
            return self.linlin(in_min, in_max, out_min, out_max);
        }
        let grow = curve.exp();
        let a = (out_max - out_min) / (Self::one() - grow);
        let b = out_min + a;
        let scaled = (self - in_min) / (in_max - in_min);
        b - a * grow.powf(scaled)
    }
}

impl<T: Float> NumberExt for T {}

// -------------------------------------------------------------------------------------------------
