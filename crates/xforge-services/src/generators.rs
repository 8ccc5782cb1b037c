//! `generate:<kind>[:params]` value generators.

use chrono::{Days, Local, NaiveDate};
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;
use xforge_config::GeneratorSpec;

const ALPHA: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// Longest `alpha:N` token; larger lengths are unusable parameters.
const MAX_ALPHA_LEN: usize = 256;

/// Seedable source of generated values.
pub struct ValueGenerator {
    seed: Option<u64>,
    rng: StdRng,
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl ValueGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed,
            rng: rng_for(seed),
        }
    }

    /// Back to the initial seed state.
    pub fn reset(&mut self) {
        self.rng = rng_for(self.seed);
    }

    /// `None` for unknown kinds or unusable parameters.
    pub fn generate(&mut self, spec: &GeneratorSpec) -> Option<String> {
        match spec.kind.as_str() {
            "uuid" => {
                let id = self.uuid_v4();
                Some(match spec.param(0) {
                    Some("short") => id.split('-').next().unwrap_or_default().to_string(),
                    Some(_) => return None,
                    None => id,
                })
            }
            "alpha" => {
                let len = match spec.param(0) {
                    Some(p) => p.parse::<usize>().ok().filter(|n| *n <= MAX_ALPHA_LEN)?,
                    None => 6,
                };
                Some((0..len).map(|_| ALPHA[self.rng.gen_range(0..ALPHA.len())] as char).collect())
            }
            "number" => {
                let min = param_or(spec, 0, 1i64)?;
                let max = param_or(spec, 1, 1000i64)?;
                (min <= max).then(|| self.rng.gen_range(min..=max).to_string())
            }
            "currency" => {
                let min = param_or(spec, 0, 10.0f64)?;
                let max = param_or(spec, 1, 1000.0f64)?;
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return None;
                }
                let v = self.rng.sample(Uniform::new_inclusive(min, max));
                Some(format!("{v:.2}"))
            }
            "date" => {
                let today = Local::now().date_naive();
                let day = match spec.param(0) {
                    None | Some("today") => Some(today),
                    Some("future") => today.checked_add_days(Days::new(self.rng.gen_range(1..=365))),
                    Some("past") => today.checked_sub_days(Days::new(self.rng.gen_range(1..=365))),
                    Some(_) => None,
                }?;
                Some(format_date(day))
            }
            _ => None,
        }
    }

    fn uuid_v4(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Uuid::from_bytes(bytes).to_string()
    }
}

fn param_or<T: std::str::FromStr>(spec: &GeneratorSpec, i: usize, default: T) -> Option<T> {
    match spec.param(i) {
        Some(p) => p.parse().ok(),
        None => Some(default),
    }
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
