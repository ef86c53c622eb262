//! Highest-and-best-use selection.
//!
//! Results are walked from the least to the most permissive scenario. A
//! later scenario only displaces the current pick when it is buildable and
//! strictly more profitable, so a denser but less profitable option never
//! masks a simpler, more profitable one.

use upzone_parcel_models::{HbuDecision, ProFormaResult};

/// Runs the waterfall over `results`, in scenario order regardless of the
/// order they are given in.
///
/// The first scenario is the starting pick even when it delivers nothing.
/// Returns `None` only for an empty input.
#[must_use]
pub fn waterfall<'a>(
    results: impl IntoIterator<Item = &'a ProFormaResult>,
) -> Option<HbuDecision> {
    let mut ordered: Vec<&ProFormaResult> = results.into_iter().collect();
    ordered.sort_by_key(|result| result.scenario);

    let mut remaining = ordered.into_iter();
    let mut best = remaining.next()?;

    for candidate in remaining {
        let bar = if best.buildable() {
            best.profit
        } else {
            f64::NEG_INFINITY
        };
        if candidate.buildable() && candidate.profit > bar {
            best = candidate;
        }
    }

    Some(HbuDecision {
        scenario: best.scenario,
        unit_yield: best.unit_yield,
        profit: best.profit,
    })
}
