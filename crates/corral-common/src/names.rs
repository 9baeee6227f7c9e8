//! Human-readable name generation.
//!
//! Names take the form `adjective_noun`, picked from small fixed word lists
//! using the randomness of a v4 UUID.

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "clever", "dapper", "eager", "fervent", "gentle", "happy",
    "jolly", "keen", "lucid", "merry", "nimble", "quiet", "rapid", "serene", "sharp",
    "steady", "sunny", "tender", "vivid", "wise", "zealous",
];

const NOUNS: &[&str] = &[
    "badger", "bison", "condor", "coyote", "falcon", "heron", "ibex", "jackal", "lynx",
    "marmot", "mustang", "ocelot", "otter", "pika", "puma", "raven", "stallion", "tapir",
    "walrus", "wapiti", "wolf", "yak", "zebra", "pronghorn",
];

/// Generate a random `adjective_noun` name.
#[must_use]
pub fn random_name() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let adjective = ADJECTIVES[usize::from(bytes[0]) % ADJECTIVES.len()];
    let noun = NOUNS[usize::from(bytes[1]) % NOUNS.len()];
    format!("{adjective}_{noun}")
}

/// Check a user-supplied name.
///
/// Names must start with an alphanumeric character and may then contain
/// alphanumerics, `_`, `.` and `-`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
