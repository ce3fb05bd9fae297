//! Incremental quadratic funding tally
//!
//! Each project keeps the sum of its contributions and the sum of the square
//! roots of those contributions. The global aggregates are maintained so that
//! at every point
//!
//! - `total_quadratic_sum == Σ sum_square_roots²`
//! - `total_linear_sum == Σ sum_contributions`
//!
//! without ever rescanning past votes: a vote of weight `w` on a project whose
//! square-root sum is `S` only moves the quadratic aggregate by `2·S·w + w²`.

use std::collections::BTreeMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alpha::Alpha;
use crate::error::{Result, TallyError};
use crate::math::isqrt;

/// Identifier of a tallied project (the proposal id)
pub type ProjectId = u64;

/// Running sums for one project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Σ contributions
    pub sum_contributions: U256,
    /// Σ √contribution
    pub sum_square_roots: U256,
}

/// Read-only view of a project's tally with funding computed on demand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub sum_contributions: U256,
    pub sum_square_roots: U256,
    /// `floor(sum_square_roots² · alpha)`
    pub quadratic_funding: U256,
    /// `floor(sum_contributions · (1 - alpha))`
    pub linear_funding: U256,
}

impl Tally {
    /// Alpha-weighted funding of the project
    pub fn funding(&self) -> Result<U256> {
        self.quadratic_funding
            .checked_add(self.linear_funding)
            .ok_or_else(|| TallyError::Overflow("project funding".to_string()))
    }
}

/// The tally engine: per-project sums plus global aggregates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuadraticTally {
    projects: BTreeMap<ProjectId, Project>,
    total_quadratic_sum: U256,
    total_linear_sum: U256,
    alpha: Alpha,
    total_funding: U256,
}

impl QuadraticTally {
    /// Create an empty tally with the given alpha
    pub fn new(alpha: Alpha) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }

    /// Validated vote entry point.
    ///
    /// The weight must be the square root of the contribution, or under-claim
    /// it by at most 10%. Over-claiming is always rejected.
    pub fn process_vote(
        &mut self,
        project_id: ProjectId,
        contribution: U256,
        vote_weight: U256,
    ) -> Result<()> {
        if contribution.is_zero() {
            return Err(TallyError::ZeroContribution);
        }
        if vote_weight.is_zero() {
            return Err(TallyError::ZeroWeight);
        }

        let squared = vote_weight
            .checked_mul(vote_weight)
            .ok_or(TallyError::SquareOverflow(vote_weight))?;
        if squared > contribution {
            return Err(TallyError::WeightExceedsContribution { squared, contribution });
        }

        let sqrt = isqrt(contribution);
        if vote_weight > sqrt {
            return Err(TallyError::WeightAboveSquareRoot { weight: vote_weight, sqrt });
        }
        if vote_weight < sqrt - sqrt / 10 {
            return Err(TallyError::WeightBelowTolerance { weight: vote_weight, sqrt });
        }

        self.process_vote_unchecked(project_id, contribution, vote_weight)
    }

    /// Trusted fast path for callers that construct `contribution = weight²`
    /// themselves. All new values are computed before anything is written.
    pub fn process_vote_unchecked(
        &mut self,
        project_id: ProjectId,
        contribution: U256,
        vote_weight: U256,
    ) -> Result<()> {
        let project = self.projects.get(&project_id).copied().unwrap_or_default();

        let new_square_roots = project
            .sum_square_roots
            .checked_add(vote_weight)
            .ok_or_else(|| {
                TallyError::Overflow(format!("square root sum of project {}", project_id))
            })?;
        let new_contributions = project
            .sum_contributions
            .checked_add(contribution)
            .ok_or_else(|| {
                TallyError::Overflow(format!("contribution sum of project {}", project_id))
            })?;

        // (S + w)² = S² + 2Sw + w²
        let old_quadratic = square(project.sum_square_roots)?;
        let delta = project
            .sum_square_roots
            .checked_mul(vote_weight)
            .and_then(|sw| sw.checked_mul(U256::from(2u8)))
            .and_then(|two_sw| {
                vote_weight
                    .checked_mul(vote_weight)
                    .and_then(|w2| two_sw.checked_add(w2))
            })
            .ok_or_else(|| {
                TallyError::Overflow(format!("quadratic delta of project {}", project_id))
            })?;
        let new_quadratic = old_quadratic
            .checked_add(delta)
            .ok_or_else(|| {
                TallyError::Overflow(format!("quadratic term of project {}", project_id))
            })?;

        let total_quadratic_sum = self
            .total_quadratic_sum
            .checked_sub(old_quadratic)
            .ok_or_else(|| {
                TallyError::Underflow("total quadratic sum below project term".to_string())
            })?
            .checked_add(new_quadratic)
            .ok_or_else(|| TallyError::Overflow("total quadratic sum".to_string()))?;
        let total_linear_sum = self
            .total_linear_sum
            .checked_sub(project.sum_contributions)
            .ok_or_else(|| {
                TallyError::Underflow("total linear sum below project term".to_string())
            })?
            .checked_add(new_contributions)
            .ok_or_else(|| TallyError::Overflow("total linear sum".to_string()))?;
        let total_funding = self.alpha.blend(total_quadratic_sum, total_linear_sum)?;

        self.projects.insert(
            project_id,
            Project {
                sum_contributions: new_contributions,
                sum_square_roots: new_square_roots,
            },
        );
        self.total_quadratic_sum = total_quadratic_sum;
        self.total_linear_sum = total_linear_sum;
        self.total_funding = total_funding;

        debug!(
            "Tallied vote on project {}: weight {}, contribution {}, total funding {}",
            project_id, vote_weight, contribution, total_funding
        );

        Ok(())
    }

    /// Tally for a project; unknown projects report zeros
    pub fn get_tally(&self, project_id: ProjectId) -> Result<Tally> {
        let project = self.projects.get(&project_id).copied().unwrap_or_default();

        Ok(Tally {
            sum_contributions: project.sum_contributions,
            sum_square_roots: project.sum_square_roots,
            quadratic_funding: self.alpha.weigh_quadratic(square(project.sum_square_roots)?)?,
            linear_funding: self.alpha.weigh_linear(project.sum_contributions)?,
        })
    }

    /// Replace alpha and recompute total funding. Returns the previous alpha.
    pub fn set_alpha(&mut self, numerator: U256, denominator: U256) -> Result<Alpha> {
        let alpha = Alpha::new(numerator, denominator)?;
        let total_funding = alpha.blend(self.total_quadratic_sum, self.total_linear_sum)?;

        let previous = std::mem::replace(&mut self.alpha, alpha);
        self.total_funding = total_funding;

        info!("Alpha changed from {} to {}, total funding now {}", previous, alpha, total_funding);

        Ok(previous)
    }

    pub fn alpha(&self) -> Alpha {
        self.alpha
    }

    pub fn total_quadratic_sum(&self) -> U256 {
        self.total_quadratic_sum
    }

    pub fn total_linear_sum(&self) -> U256 {
        self.total_linear_sum
    }

    /// `floor(total_quadratic_sum · alpha) + floor(total_linear_sum · (1 - alpha))`
    pub fn total_funding(&self) -> U256 {
        self.total_funding
    }

    /// Ids of every project that has received at least one vote
    pub fn projects(&self) -> impl Iterator<Item = ProjectId> + '_ {
        self.projects.keys().copied()
    }

    pub fn project(&self, project_id: ProjectId) -> Option<&Project> {
        self.projects.get(&project_id)
    }
}

fn square(value: U256) -> Result<U256> {
    value
        .checked_mul(value)
        .ok_or(TallyError::SquareOverflow(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(value: u64) -> U256 {
        U256::from(value)
    }

    fn tally_with_three_votes(alpha: Alpha) -> QuadraticTally {
        let mut tally = QuadraticTally::new(alpha);
        tally.process_vote(1, u(100), u(10)).unwrap();
        tally.process_vote(1, u(400), u(20)).unwrap();
        tally.process_vote(1, u(900), u(30)).unwrap();
        tally
    }

    #[test]
    fn test_pure_quadratic_funding() {
        let tally = tally_with_three_votes(Alpha::one());
        let result = tally.get_tally(1).unwrap();

        assert_eq!(result.sum_square_roots, u(60));
        assert_eq!(result.sum_contributions, u(1400));
        assert_eq!(result.quadratic_funding, u(3600));
        assert_eq!(result.linear_funding, u(0));
        assert_eq!(tally.total_funding(), u(3600));
    }

    #[test]
    fn test_pure_linear_funding() {
        let tally = tally_with_three_votes(Alpha::zero());
        let result = tally.get_tally(1).unwrap();

        assert_eq!(result.quadratic_funding, u(0));
        assert_eq!(result.linear_funding, u(1400));
        assert_eq!(result.funding().unwrap(), u(1400));
        assert_eq!(tally.total_funding(), u(1400));
    }

    #[test]
    fn test_rejects_zero_inputs() {
        let mut tally = QuadraticTally::default();
        assert_eq!(tally.process_vote(1, u(0), u(1)), Err(TallyError::ZeroContribution));
        assert_eq!(tally.process_vote(1, u(1), u(0)), Err(TallyError::ZeroWeight));
    }

    #[test]
    fn test_rejects_over_claimed_weight() {
        let mut tally = QuadraticTally::default();
        assert!(matches!(
            tally.process_vote(1, u(99), u(10)),
            Err(TallyError::WeightExceedsContribution { .. })
        ));
        assert!(matches!(
            tally.process_vote(1, U256::MAX, U256::MAX),
            Err(TallyError::SquareOverflow(_))
        ));
    }

    #[test]
    fn test_tolerates_slight_under_claim() {
        let mut tally = QuadraticTally::default();
        // sqrt(10_000) = 100, 10% tolerance allows down to 90
        assert!(tally.process_vote(1, u(10_000), u(90)).is_ok());
        assert!(matches!(
            tally.process_vote(1, u(10_000), u(89)),
            Err(TallyError::WeightBelowTolerance { .. })
        ));
    }

    #[test]
    fn test_failed_vote_leaves_state_untouched() {
        let mut tally = tally_with_three_votes(Alpha::one());
        let before = tally.clone();
        let _ = tally.process_vote(1, u(50), u(8));

        assert_eq!(tally.get_tally(1).unwrap(), before.get_tally(1).unwrap());
        assert_eq!(tally.total_quadratic_sum(), before.total_quadratic_sum());
        assert_eq!(tally.total_linear_sum(), before.total_linear_sum());
    }

    #[test]
    fn test_aggregates_across_projects() {
        let mut tally = QuadraticTally::default();
        tally.process_vote_unchecked(1, u(16), u(4)).unwrap();
        tally.process_vote_unchecked(2, u(9), u(3)).unwrap();
        tally.process_vote_unchecked(1, u(25), u(5)).unwrap();

        // project 1: (4 + 5)² = 81, project 2: 3² = 9
        assert_eq!(tally.total_quadratic_sum(), u(90));
        assert_eq!(tally.total_linear_sum(), u(50));
        assert_eq!(tally.projects().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_set_alpha_recomputes_total() {
        let mut tally = tally_with_three_votes(Alpha::one());
        let previous = tally.set_alpha(u(1), u(2)).unwrap();

        assert_eq!(previous, Alpha::one());
        assert_eq!(tally.total_funding(), u(1800 + 700));
        assert!(tally.set_alpha(u(3), u(2)).is_err());
        assert!(tally.set_alpha(u(0), u(0)).is_err());
        assert_eq!(tally.alpha(), Alpha::new(u(1), u(2)).unwrap());
    }

    #[test]
    fn test_unknown_project_is_empty() {
        let tally = QuadraticTally::default();
        assert_eq!(tally.get_tally(42).unwrap(), Tally::default());
        assert!(tally.project(42).is_none());
    }
}
