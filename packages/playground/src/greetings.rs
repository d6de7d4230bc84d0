//! Greeting helpers.

use rand::Rng;
use std::collections::BTreeMap;
use thiserror::Error;


#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GreetingError {
    #[error("empty name")]
    EmptyName,
}

const FORMATS: usize = 3;

fn format_greeting(format: usize, name: &str) -> String {
    match format {
        0 => format!("Hi, {}", name),
        1 => format!("Great to see you, {}", name),
        _ => format!("Hail, {}! Well met!", name),
    }
}

/// Greet a single person, in a format picked at random
pub fn hello<R: Rng + ?Sized>(name: &str, rng: &mut R) -> Result<String, GreetingError> {
    if name.is_empty() {
        return Err(GreetingError::EmptyName);
    }
    Ok(format_greeting(rng.gen_range(0..FORMATS), name))
}

/// Greet several people, keyed by name
///
/// Fails with the first error encountered, in which case no greetings are returned.
pub fn hellos<R, S>(names: &[S], rng: &mut R) -> Result<BTreeMap<String, String>, GreetingError>
where
    R: Rng + ?Sized,
    S: AsRef<str>,
{
    let mut messages = BTreeMap::new();
    for name in names {
        let name = name.as_ref();
        messages.insert(name.to_owned(), hello(name, rng)?);
    }
    Ok(messages)
}
