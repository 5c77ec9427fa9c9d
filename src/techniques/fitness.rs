use crate::ebi_objects::alignments::{AlignmentResult, Move};

pub trait Fitness {
    /// Synchronous moves divided by all non-silent moves; 1 if there are none.
    fn trace_fitness(self) -> f64;
}

impl Fitness for &[Move] {
    fn trace_fitness(self) -> f64 {
        let count_synchronous = self.iter().filter(|movee| movee.is_synchronous()).count();
        let count_moves = self.iter().filter(|movee| !movee.is_silent()).count();
        if count_moves == 0 {
            1.0
        } else {
            count_synchronous as f64 / count_moves as f64
        }
    }
}

impl Fitness for &AlignmentResult {
    fn trace_fitness(self) -> f64 {
        self.alignment.as_slice().trace_fitness()
    }
}

#[cfg(test)]
mod tests {
    use crate::ebi_objects::alignments::{AlignmentResult, AlignmentStatus, Move};

    use super::Fitness;

    #[test]
    fn trace_fitness_test() {
        let mut result = AlignmentResult::not_started(AlignmentStatus::Optimal);
        assert_eq!((&result).trace_fitness(), 1.0);

        result.alignment = vec![
            Move::SynchronousMove {
                label: "a".to_string(),
                transition: None,
            },
            Move::SilentMove { transition: None },
            Move::LogMove {
                label: "b".to_string(),
            },
            Move::ModelMove {
                label: "c".to_string(),
                transition: None,
            },
            Move::SynchronousMove {
                label: "d".to_string(),
                transition: None,
            },
        ];
        assert_eq!((&result).trace_fitness(), 0.5);
    }
}
