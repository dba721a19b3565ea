use crate::network::line::{Color, LineCode};

const PALETTE: [&str; 12] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#469990",
    "#9a6324", "#800000", "#808000", "#000075",
];

/// Fallback color for a line whose record does not carry one.
pub fn default_color(line: &LineCode) -> Color {
    let key = match line.as_str().parse::<u64>() {
        Ok(n) => n,
        Err(_) => line.as_str().bytes().map(u64::from).sum(),
    };
    let idx = (key % PALETTE.len() as u64) as usize;

    Color::trusted(PALETTE[idx])
}
