use rand::seq::SliceRandom;
use rand::Rng;

/// TV shows the demo device cycles through as media titles
pub const TV_SHOWS: [&str; 20] = [
    "Breaking Bad",
    "The Wire",
    "Game of Thrones",
    "The Sopranos",
    "Mad Men",
    "The Office",
    "Friends",
    "Seinfeld",
    "Stranger Things",
    "The Mandalorian",
    "Ted Lasso",
    "Succession",
    "Better Call Saul",
    "The Crown",
    "Chernobyl",
    "Fleabag",
    "Black Mirror",
    "Fargo",
    "True Detective",
    "Westworld",
];

/// Pick a random show other than `current`
pub fn pick_show<R: Rng + ?Sized>(current: &str, rng: &mut R) -> &'static str {
    let candidates: Vec<&'static str> = TV_SHOWS
        .iter()
        .copied()
        .filter(|show| *show != current)
        .collect();

    candidates.choose(rng).copied().unwrap_or(TV_SHOWS[0])
}
