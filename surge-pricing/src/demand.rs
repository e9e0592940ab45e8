use serde::{Deserialize, Serialize};

/// Prediction when there is no usable history
pub const BASELINE_DEMAND: f64 = 100.0;

/// Most observations the estimator looks at
pub const MAX_HISTORY: usize = 30;

/// Observed (price, demand) pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DemandData {
    pub price: f64,
    pub demand: f64,
}

impl DemandData {
    fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.demand.is_finite() && self.demand >= 0.0
    }
}

/// Linear demand curve anchored at the mean of recent observations.
///
/// `predict` is a pure function of the price, the captured history and the
/// elasticity, so it can be sampled freely by the profit search.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandEstimator {
    anchor: Option<(f64, f64)>,
    elasticity: f64,
}

impl DemandEstimator {
    /// `history` is expected newest first; only the first `MAX_HISTORY` usable points count.
    pub fn new(history: &[DemandData], elasticity: f64) -> Self {
        let usable: Vec<&DemandData> = history
            .iter()
            .filter(|d| d.is_usable())
            .take(MAX_HISTORY)
            .collect();

        let anchor = if usable.is_empty() {
            None
        } else {
            let n = usable.len() as f64;
            let mean_price = usable.iter().map(|d| d.price).sum::<f64>() / n;
            let mean_demand = usable.iter().map(|d| d.demand).sum::<f64>() / n;
            Some((mean_price, mean_demand))
        };

        Self {
            anchor,
            elasticity: sanitize_elasticity(elasticity),
        }
    }

    /// Predicted demand at `price`, never negative.
    pub fn predict(&self, price: f64) -> f64 {
        match self.anchor {
            None => BASELINE_DEMAND,
            Some((mean_price, mean_demand)) => {
                let change = (price - mean_price) / mean_price;
                let predicted = mean_demand * (1.0 - self.elasticity * change);
                if predicted.is_finite() {
                    predicted.max(0.0)
                } else {
                    0.0
                }
            }
        }
    }

    /// Borrowing closure over `predict`, the shape the profit search takes.
    pub fn as_fn(&self) -> impl Fn(f64) -> f64 + '_ {
        move |price| self.predict(price)
    }
}

/// Elasticity must be a positive finite number; anything else means "unknown".
pub fn sanitize_elasticity(elasticity: f64) -> f64 {
    if elasticity.is_finite() && elasticity > 0.0 {
        elasticity
    } else {
        1.0
    }
}
