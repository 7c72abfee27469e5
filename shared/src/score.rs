use crate::SCORE_DISPLAY_DIVISOR;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub kills: u32,
    pub deaths: u32,
}

impl Score {
    pub fn new(kills: u32, deaths: u32) -> Self {
        Self { kills, deaths }
    }
}

/// Renders one ranking line as `kills/deaths-name`.
///
/// Both counters are shown divided by `SCORE_DISPLAY_DIVISOR` with integer
/// division. This is the established display convention for the score table
/// and is kept as is.
pub fn format_score(name: &str, score: Score) -> String {
    format!(
        "{}/{}-{}",
        score.kills / SCORE_DISPLAY_DIVISOR,
        score.deaths / SCORE_DISPLAY_DIVISOR,
        name
    )
}

/// Kill/death table keyed by player name, kept in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBoard {
    entries: Vec<(String, Score)>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    /// Returns the entry for `name`, creating an empty one at the end if needed.
    pub fn ensure(&mut self, name: &str) -> &mut Score {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                self.entries.push((name.to_string(), Score::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Overwrites an entry in place, or appends it.
    pub fn set(&mut self, name: &str, score: Score) {
        *self.ensure(name) = score;
    }

    pub fn get(&self, name: &str) -> Option<Score> {
        self.position(name).map(|idx| self.entries[idx].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Score> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Credits a kill and a death. Returns the updated (attacker, victim)
    /// scores.
    pub fn record_kill(&mut self, attacker: &str, victim: &str) -> (Score, Score) {
        self.ensure(attacker).kills += 1;
        self.ensure(victim).deaths += 1;
        (
            self.get(attacker).unwrap_or_default(),
            self.get(victim).unwrap_or_default(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Score)> + '_ {
        self.entries.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ranking lines, most kills first. Ties keep insertion order.
    pub fn ranking(&self) -> Vec<String> {
        let mut sorted: Vec<&(String, Score)> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.1.kills.cmp(&a.1.kills));
        sorted
            .into_iter()
            .map(|(name, score)| format_score(name, *score))
            .collect()
    }
}
