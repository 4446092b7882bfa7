use rand::{seq::SliceRandom, Rng};

const COLORS: [&str; 9] = [
    "Red", "Orange", "Yellow", "Green", "Blue", "Indigo", "Violet", "Purple", "Lavender",
];

const TREATS: [&str; 14] = [
    "Cupcake",
    "Donut",
    "Eclair",
    "Froyo",
    "Gingerbread",
    "Honeycomb",
    "Ice Cream Sandwich",
    "Jellybean",
    "Kit Kat",
    "Lollipop",
    "Marshmallow",
    "Nougat",
    "Oreo",
    "Pie",
];

/// Random display name for this device, e.g. "Indigo Froyo".
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    // Both vocabularies are non-empty constants
    let color = COLORS.choose(rng).copied().unwrap_or(COLORS[0]);
    let treat = TREATS.choose(rng).copied().unwrap_or(TREATS[0]);
    format!("{color} {treat}")
}
