use crate::core::io::IoError;
use crate::engine::config::Objective;
use crate::engine::connectivity::ConnectivityVector;
use crate::engine::district::SystemCombination;
use std::collections::BTreeMap;
use std::path::Path;

/// Layout and structure summary of one network of a candidate.
#[derive(Debug, Clone)]
pub struct NetworkDetail {
    pub network: String,
    pub members: Vec<String>,
    /// component code and maximum viable capacity, per indicator slot
    pub max_capacities: Vec<(String, f64)>,
}

/// Everything worth remembering about one evaluated candidate before the
/// generation's selection runs.
#[derive(Debug, Clone)]
pub struct CandidateDetails {
    pub connectivity: String,
    pub networks: Vec<NetworkDetail>,
}

#[derive(Debug, Clone)]
struct NetworkRow {
    generation: usize,
    ind_code: usize,
    connectivity: String,
    network: String,
    member_flags: Vec<&'static str>,
}

#[derive(Debug, Clone)]
struct CombinationRow {
    generation: usize,
    front: usize,
    ind_code: usize,
    connectivity: String,
    combination: String,
}

#[derive(Debug, Clone)]
struct FitnessRow {
    generation: usize,
    front: usize,
    ind_code: usize,
    connectivity: String,
    combination: String,
    values: Vec<f64>,
}

/// Records the evolution of the non-dominated fronts generation by
/// generation, for the debug output trio (network, supply-system and
/// fitness trackers).
#[derive(Debug)]
pub struct OptimizationTracker {
    objectives: Vec<Objective>,
    buildings: Vec<String>,
    current_generation: usize,
    candidate_details: BTreeMap<String, CandidateDetails>,
    network_rows: Vec<NetworkRow>,
    combination_rows: Vec<CombinationRow>,
    fitness_rows: Vec<FitnessRow>,
}

impl OptimizationTracker {
    pub fn new(objectives: Vec<Objective>, buildings: Vec<String>) -> Self {
        Self {
            objectives,
            buildings,
            current_generation: 0,
            candidate_details: BTreeMap::new(),
            network_rows: Vec::new(),
            combination_rows: Vec::new(),
            fitness_rows: Vec::new(),
        }
    }

    /// Folds the candidate details returned by (possibly parallel)
    /// evaluation tasks into the tracker.
    pub fn consolidate(&mut self, deltas: impl IntoIterator<Item = CandidateDetails>) {
        for details in deltas {
            self.candidate_details
                .insert(details.connectivity.clone(), details);
        }
    }

    /// Records the generation's surviving individuals and the fronts their
    /// combinations landed in, then advances the generation counter.
    pub fn update_selection(
        &mut self,
        selection: &[ConnectivityVector],
        pooled: &[&SystemCombination],
        fronts: &[Vec<usize>],
    ) {
        let ind_codes: BTreeMap<String, usize> = selection
            .iter()
            .enumerate()
            .map(|(position, vector)| (vector.as_str(), position + 1))
            .collect();

        for vector in selection {
            let connectivity = vector.as_str();
            let Some(details) = self.candidate_details.get(&connectivity) else {
                continue;
            };
            for network in &details.networks {
                let member_flags = self
                    .buildings
                    .iter()
                    .map(|building| {
                        if network.members.contains(building) {
                            "X"
                        } else {
                            "-"
                        }
                    })
                    .collect();
                self.network_rows.push(NetworkRow {
                    generation: self.current_generation,
                    ind_code: ind_codes[&connectivity],
                    connectivity: connectivity.clone(),
                    network: network.network.clone(),
                    member_flags,
                });
            }
        }

        // walk the fronts until every survivor has at least one recorded
        // combination
        let mut covered: BTreeMap<&String, bool> =
            ind_codes.keys().map(|key| (key, false)).collect();
        'fronts: for (front_number, front) in fronts.iter().enumerate() {
            if covered.values().all(|&seen| seen) {
                break 'fronts;
            }
            for &index in front {
                let combination = pooled[index];
                let Some(owner) = combination.encoding.first() else {
                    continue;
                };
                let Some(&ind_code) = ind_codes.get(owner) else {
                    continue;
                };
                if let Some(seen) = covered.get_mut(owner) {
                    *seen = true;
                }
                let combination_id = combination.encoding[1..].join("_");
                self.combination_rows.push(CombinationRow {
                    generation: self.current_generation,
                    front: front_number + 1,
                    ind_code,
                    connectivity: owner.clone(),
                    combination: combination_id.clone(),
                });
                self.fitness_rows.push(FitnessRow {
                    generation: self.current_generation,
                    front: front_number + 1,
                    ind_code,
                    connectivity: owner.clone(),
                    combination: combination_id,
                    values: combination.fitness.values().to_vec(),
                });
            }
        }

        self.current_generation += 1;
    }

    /// Writes the debug tracker trio into the given directory.
    pub fn write_csvs(&self, directory: &Path) -> Result<(), IoError> {
        let path = directory.join("network_tracker.csv");
        let mut writer = csv::Writer::from_path(&path).map_err(|source| IoError::Csv {
            path: path.clone(),
            source,
        })?;
        let mut header = vec![
            "Generation".to_string(),
            "Ind_Code".to_string(),
            "Connectivity".to_string(),
            "Network".to_string(),
        ];
        header.extend(self.buildings.iter().cloned());
        writer
            .write_record(&header)
            .map_err(|source| IoError::Csv {
                path: path.clone(),
                source,
            })?;
        for row in &self.network_rows {
            let mut record = vec![
                row.generation.to_string(),
                row.ind_code.to_string(),
                row.connectivity.clone(),
                row.network.clone(),
            ];
            record.extend(row.member_flags.iter().map(|flag| flag.to_string()));
            writer
                .write_record(&record)
                .map_err(|source| IoError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| IoError::Write {
            path,
            source,
        })?;

        let path = directory.join("supply_system_tracker.csv");
        let mut writer = csv::Writer::from_path(&path).map_err(|source| IoError::Csv {
            path: path.clone(),
            source,
        })?;
        writer
            .write_record(["Generation", "Front", "Ind_Code", "Connectivity", "SupSys_Combination"])
            .map_err(|source| IoError::Csv {
                path: path.clone(),
                source,
            })?;
        for row in &self.combination_rows {
            writer
                .write_record([
                    row.generation.to_string(),
                    row.front.to_string(),
                    row.ind_code.to_string(),
                    row.connectivity.clone(),
                    row.combination.clone(),
                ])
                .map_err(|source| IoError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| IoError::Write {
            path,
            source,
        })?;

        let path = directory.join("fitness_tracker.csv");
        let mut writer = csv::Writer::from_path(&path).map_err(|source| IoError::Csv {
            path: path.clone(),
            source,
        })?;
        let mut header = vec![
            "Generation".to_string(),
            "Front".to_string(),
            "Ind_Code".to_string(),
            "Connectivity".to_string(),
            "SupSys_Combination".to_string(),
        ];
        header.extend(self.objectives.iter().map(|o| o.label().to_string()));
        writer
            .write_record(&header)
            .map_err(|source| IoError::Csv {
                path: path.clone(),
                source,
            })?;
        for row in &self.fitness_rows {
            let mut record = vec![
                row.generation.to_string(),
                row.front.to_string(),
                row.ind_code.to_string(),
                row.connectivity.clone(),
                row.combination.clone(),
            ];
            record.extend(row.values.iter().map(|v| format!("{v:.2}")));
            writer
                .write_record(&record)
                .map_err(|source| IoError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| IoError::Write {
            path,
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RunSettings;
    use crate::engine::context::fixtures::context_with;
    use crate::engine::fitness::Fitness;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn selection_updates_append_rows_and_advance_generations() {
        let context = context_with(RunSettings::defaults(), false);
        let mut rng = StdRng::seed_from_u64(5);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 0, 0], &context, &mut rng).unwrap();
        let mut tracker = OptimizationTracker::new(
            vec![Objective::Cost, Objective::GhgEmissions],
            context.ordered_building_ids(),
        );
        tracker.consolidate([CandidateDetails {
            connectivity: vector.as_str(),
            networks: vec![NetworkDetail {
                network: "N1001".to_string(),
                members: vec!["B1001".to_string(), "B1002".to_string()],
                max_capacities: vec![("BO1".to_string(), 120.0)],
            }],
        }]);
        let combination = SystemCombination {
            encoding: vec![vector.as_str(), "N1001-0".to_string()],
            fitness: Fitness::new(vec![100.0, 10.0]),
        };
        let pooled = vec![&combination];
        tracker.update_selection(&[vector], &pooled, &[vec![0]]);
        assert_eq!(tracker.network_rows.len(), 1);
        assert_eq!(tracker.network_rows[0].member_flags, vec!["X", "X", "-", "-"]);
        assert_eq!(tracker.fitness_rows.len(), 1);
        assert_eq!(tracker.current_generation, 1);

        let dir = tempfile::tempdir().unwrap();
        tracker.write_csvs(dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("fitness_tracker.csv")).unwrap();
        assert!(text.contains("cost"));
        assert!(text.contains("100.00"));
    }
}
