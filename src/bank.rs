use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ProctorError, Result};
use crate::modality::{Modality, QuestionSet};

static BANK_DIR: Dir = include_dir!("src/banks");

/// A named set of questions, either built in or read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub name: String,
    pub set: QuestionSet,
}

impl Bank {
    pub fn builtin(modality: Modality) -> Result<Self> {
        let file_name = format!("{modality}.json");
        let file = BANK_DIR.get_file(&file_name).ok_or_else(|| {
            ProctorError::InvalidConfig(format!("no built-in bank `{file_name}`"))
        })?;
        let contents = file.contents_utf8().ok_or_else(|| {
            ProctorError::InvalidConfig(format!("bank `{file_name}` is not utf-8"))
        })?;
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn modality(&self) -> Modality {
        self.set.modality()
    }

    /// Questions ready for a session: interview questions without their own
    /// limit get `answer_secs`, and order is shuffled when asked.
    pub fn questions<R: Rng + ?Sized>(
        &self,
        shuffle: bool,
        answer_secs: u32,
        rng: &mut R,
    ) -> QuestionSet {
        let mut set = self.set.clone();
        match &mut set {
            QuestionSet::Mcq(q) if shuffle => q.shuffle(rng),
            QuestionSet::Coding(q) if shuffle => q.shuffle(rng),
            QuestionSet::Interview(q) => {
                for question in q.iter_mut() {
                    question.time_limit_secs.get_or_insert(answer_secs);
                }
                if shuffle {
                    q.shuffle(rng);
                }
            }
            _ => {}
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn builtin_banks_match_their_modality() {
        for modality in [Modality::Mcq, Modality::Coding, Modality::Interview] {
            let bank = Bank::builtin(modality).unwrap();
            assert_eq!(bank.modality(), modality);
            assert!(!bank.set.is_empty());
            assert!(!bank.name.is_empty());
        }
    }

    #[test]
    fn interview_limits_filled_from_default() {
        let bank = Bank::builtin(Modality::Interview).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let QuestionSet::Interview(questions) = bank.questions(false, 90, &mut rng) else {
            panic!("expected interview questions");
        };
        assert_eq!(questions[0].time_limit_secs, Some(90));
        assert_eq!(questions[2].time_limit_secs, Some(180));
    }

    #[test]
    fn shuffle_keeps_the_same_questions() {
        let bank = Bank::builtin(Modality::Mcq).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = bank.questions(true, 120, &mut rng);
        let mut before: Vec<_> = bank.set.ids().into_iter().cloned().collect();
        let mut after: Vec<_> = shuffled.ids().into_iter().cloned().collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
        assert_eq!(bank.questions(false, 120, &mut rng), bank.set);
    }

    #[test]
    fn bank_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bank.json");
        std::fs::write(
            &path,
            r#"{"name":"tiny","set":{"modality":"mcq","questions":[{"id":"a","prompt":"?","options":["x","y"]}]}}"#,
        )
        .unwrap();
        let bank = Bank::from_file(&path).unwrap();
        assert_eq!(bank.name, "tiny");
        assert_eq!(bank.set.len(), 1);

        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(Bank::from_file(&path), Err(ProctorError::Json(_))));
    }
}
