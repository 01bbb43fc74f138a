//! Escalation advisory: where a user sits on the intervention ladder.
//!
//! Ladder: message → calendar → social → financial. When the latest
//! intervention failed or was skipped the next rung is one above it (capped
//! at financial); otherwise the latest kind is repeated.

use resguard_core::{
    EscalationAdvice, EscalationStage, Intervention, InterventionOutcome, InterventionType,
};

fn stage_for(rung: InterventionType) -> EscalationStage {
    match rung {
        InterventionType::Message | InterventionType::Unknown => EscalationStage::Nudged,
        InterventionType::Calendar | InterventionType::Social => EscalationStage::Escalated,
        InterventionType::Financial => EscalationStage::Critical,
    }
}

/// Advice from a user's intervention history, in any order.
pub fn advise(history: &[Intervention]) -> EscalationAdvice {
    let known: Vec<&Intervention> = history
        .iter()
        .filter(|i| i.kind != InterventionType::Unknown)
        .collect();

    let failed_interventions = known
        .iter()
        .filter(|i| {
            matches!(
                i.outcome,
                InterventionOutcome::Failed | InterventionOutcome::Skipped
            )
        })
        .count();

    // Latest by deployment time; later entries win ties.
    let Some(latest) = known
        .iter()
        .enumerate()
        .max_by_key(|(n, i)| (i.deployed_at, *n))
        .map(|(_, i)| *i)
    else {
        return EscalationAdvice {
            stage: EscalationStage::Nominal,
            next_rung: InterventionType::Message,
            failed_interventions: 0,
        };
    };

    let next_rung = match latest.outcome {
        InterventionOutcome::Failed | InterventionOutcome::Skipped => latest.kind.escalate(),
        InterventionOutcome::Pending | InterventionOutcome::Success => latest.kind,
    };

    EscalationAdvice {
        stage: stage_for(next_rung),
        next_rung,
        failed_interventions,
    }
}
