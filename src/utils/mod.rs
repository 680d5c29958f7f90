pub mod transliteration;
pub mod validation;
