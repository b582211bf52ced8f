use rand::Rng;

use crate::models::DurationProfile;

pub fn exponential<R: Rng + ?Sized>(rng: &mut R, rate: f64) -> f64 {
    if rate <= 0.0 {
        return f64::INFINITY;
    }
    let u = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    -u.ln() / rate
}

pub fn normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Whole-minute parking duration, never shorter than the profile's minimum
/// and never zero.
pub fn sample_duration<R: Rng + ?Sized>(rng: &mut R, profile: &DurationProfile) -> u64 {
    let (minutes, min) = match profile {
        DurationProfile::Fixed { minutes } => (*minutes as f64, 1),
        DurationProfile::Normal { mean, std_dev, min } => (normal(rng, *mean, *std_dev), *min),
        DurationProfile::Exponential { mean, min } => (exponential(rng, 1.0 / mean), *min),
    };
    let rounded = if minutes.is_finite() {
        minutes.round().max(0.0) as u64
    } else {
        0
    };
    rounded.max(min).max(1)
}

#[derive(Clone, Debug)]
pub struct WeightedChoice {
    cumulative: Vec<f64>,
}

impl WeightedChoice {
    pub fn new<I>(weights: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut total = 0.0;
        let cumulative: Vec<f64> = weights
            .into_iter()
            .map(|weight| {
                total += weight.max(0.0);
                total
            })
            .collect();
        if total <= 0.0 {
            return None;
        }
        Some(Self { cumulative })
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if self.cumulative.len() == 1 {
            return 0;
        }
        let total = self.cumulative[self.cumulative.len() - 1];
        let target = rng.gen::<f64>() * total;
        self.cumulative
            .iter()
            .position(|&bound| target < bound)
            .unwrap_or(self.cumulative.len() - 1)
    }
}
