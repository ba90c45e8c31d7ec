use serde::Serialize;

use crate::models::{BibNumber, Reading};

/// Accumulated weight per distinct digit string, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    entries: Vec<(String, u32)>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_readings<'a>(readings: impl IntoIterator<Item = &'a Reading>) -> Self {
        let mut tally = Self::new();
        for reading in readings {
            tally.add(reading);
        }
        tally
    }

    pub fn add(&mut self, reading: &Reading) {
        match self.entries.iter_mut().find(|(digits, _)| digits == reading.digits()) {
            Some((_, weight)) => *weight += reading.weight(),
            None => self
                .entries
                .push((reading.digits().to_string(), reading.weight())),
        }
    }

    pub fn weight_of(&self, digits: &str) -> u32 {
        self.entries
            .iter()
            .find(|(d, _)| d == digits)
            .map_or(0, |(_, w)| *w)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(d, w)| (d.as_str(), *w))
    }

    /// Entry with the highest weight. On a tie the entry seen first wins.
    pub fn best(&self) -> Option<(&str, u32)> {
        let mut best: Option<(&str, u32)> = None;
        for (digits, weight) in self.iter() {
            if best.is_none_or(|(_, w)| weight > w) {
                best = Some((digits, weight));
            }
        }
        best
    }
}

/// Reduce all readings of one image to a single bib number.
pub fn vote<'a>(readings: impl IntoIterator<Item = &'a Reading>) -> Option<BibNumber> {
    let tally = Tally::from_readings(readings);
    winner(&tally)
}

pub fn winner(tally: &Tally) -> Option<BibNumber> {
    let (digits, _) = tally.best()?;
    Reading::from_raw(digits).map(|r| BibNumber::from(&r))
}
