/// Ordered header map with case-insensitive names.
///
/// The first spelling of a name is kept; later writes replace the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
  entries: Vec<(String, String)>,
}

pub const CONTENT_TYPE: &str = "Content-Type";
pub const AUTHORIZATION: &str = "Authorization";

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.get(name).is_some()
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match self
      .entries
      .iter_mut()
      .find(|(k, _)| k.eq_ignore_ascii_case(&name))
    {
      Some(slot) => slot.1 = value,
      None => self.entries.push((name, value)),
    }
  }

  pub fn remove(&mut self, name: &str) -> Option<String> {
    let idx = self
      .entries
      .iter()
      .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
    Some(self.entries.remove(idx).1)
  }

  /// Overlay `other` onto `self`; values from `other` win.
  pub fn merge(&mut self, other: &Headers) {
    for (name, value) in &other.entries {
      self.set(name.clone(), value.clone());
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut headers = Headers::new();
    for (k, v) in iter {
      headers.set(k, v);
    }
    headers
  }
}
