//! Joining a single contest: fetch, extract, solve, submit

use crate::error::{ContestError, Result};
use crate::site::{ContestRef, SubmitOutcome};
use crate::worker::ContestWorker;
use std::fmt;
use tracing::{debug, info, warn};

/// Terminal result of participating in one contest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipationOutcome {
    /// Submission confirmed by the site
    Joined,
    /// No active challenge, or the contest refused us for a non-captcha reason
    Skipped { reason: String },
    /// The answer budget ran out while the captcha kept failing
    AnswerRejected,
}

/// Step of a participation attempt, recorded in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Fetching,
    ExtractingChallenge,
    Solving,
    Submitting,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Fetching => "fetching",
            AttemptState::ExtractingChallenge => "extracting_challenge",
            AttemptState::Solving => "solving",
            AttemptState::Submitting => "submitting",
        };
        f.write_str(name)
    }
}

impl ContestWorker {
    /// Participate in a contest, retrying while the captcha answer is wrong.
    ///
    /// Returns:
    /// - Ok(Joined | Skipped | AnswerRejected) for every expected ending
    /// - Err for transport failures, cancellation and unexpected errors
    pub async fn participate(&self, contest: &ContestRef) -> Result<ParticipationOutcome> {
        let policy = self.config().answer_retry_policy();

        match policy
            .execute_until(|| self.attempt(contest), self.shutdown_token())
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(ContestError::AnswerRejected(reason)) => {
                warn!(contest = %contest, "Giving up on captcha: {}", reason);
                Ok(ParticipationOutcome::AnswerRejected)
            }
            Err(e) => Err(e),
        }
    }

    /// One pass through the state machine.
    ///
    /// Fetching and solving stop on shutdown; a started submission always
    /// runs to completion so the join state is never ambiguous.
    async fn attempt(&self, contest: &ContestRef) -> Result<ParticipationOutcome> {
        debug!(contest = %contest, state = %AttemptState::Fetching, "Attempt started");
        let page = self
            .until_shutdown(self.site().fetch_thread_page(contest))
            .await?;

        debug!(contest = %contest, state = %AttemptState::ExtractingChallenge, "Page fetched");
        let challenge = match self.site().extract_captcha(&page) {
            Ok(challenge) => challenge,
            Err(ContestError::CaptchaNotFound(reason)) => {
                return Ok(ParticipationOutcome::Skipped { reason });
            }
            Err(e) => return Err(e),
        };

        debug!(contest = %contest, state = %AttemptState::Solving, grid_size = challenge.grid_size, "Challenge found");
        let answer = self
            .until_shutdown(self.solver().solve(&challenge.image, challenge.grid_size))
            .await?;
        if !answer.is_valid_for(&challenge) {
            return Err(ContestError::AnswerRejected(format!(
                "response from solver: ({}, {})",
                answer.x, answer.y
            )));
        }
        debug!(
            contest = %contest,
            state = %AttemptState::Submitting,
            "Response from solver: ({}, {})",
            answer.x,
            answer.y
        );
        let outcome = self
            .site()
            .submit_participation(contest, &challenge, answer)
            .await?;

        match outcome {
            SubmitOutcome::Joined => {
                info!("Participated in {}", contest);
                Ok(ParticipationOutcome::Joined)
            }
            rejected if rejected.is_captcha_failure() => Err(ContestError::AnswerRejected(
                "got wrong answer from solver".to_string(),
            )),
            SubmitOutcome::Rejected { message } => Ok(ParticipationOutcome::Skipped {
                reason: format!("contest is unavailable: {}", message),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_state_names() {
        assert_eq!(AttemptState::Fetching.to_string(), "fetching");
        assert_eq!(
            AttemptState::ExtractingChallenge.to_string(),
            "extracting_challenge"
        );
        assert_eq!(AttemptState::Submitting.to_string(), "submitting");
    }
}
