use crate::normalize::ClassPathFragment;
use crate::scoring::TeamScores;
use crate::AttributionError;
use std::collections::BTreeSet;
use triage_core::RawErrorRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedRecord {
    pub record: RawErrorRecord,
    pub fragments: Vec<ClassPathFragment>,
    pub scores: TeamScores,
    pub predicted_owning_team: String,
}

impl AttributedRecord {
    /// How many matched aliases corroborate this record's own prediction.
    pub fn evidence(&self) -> usize {
        self.scores.label_entry_count(&self.predicted_owning_team)
    }
}

/// Collapses an incident's attributed records to one representative per
/// predicted team. When every record agrees, the record with the most
/// evidence for that team is kept (first one on ties).
pub fn reduce_records(
    records: Vec<AttributedRecord>,
) -> Result<Vec<AttributedRecord>, AttributionError> {
    let Some(first) = records.first() else {
        return Err(AttributionError::NothingToReduce);
    };

    let unanimous = records
        .iter()
        .all(|record| record.predicted_owning_team == first.predicted_owning_team);

    if unanimous {
        let mut best_index = 0usize;
        let mut best_evidence = first.evidence();
        for (index, record) in records.iter().enumerate().skip(1) {
            let evidence = record.evidence();
            if evidence > best_evidence {
                best_index = index;
                best_evidence = evidence;
            }
        }
        return Ok(records.into_iter().nth(best_index).into_iter().collect());
    }

    let mut seen = BTreeSet::new();
    Ok(records
        .into_iter()
        .filter(|record| seen.insert(record.predicted_owning_team.clone()))
        .collect())
}
