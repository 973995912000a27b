//! Lexical tokenization for BM25 scoring

/// Tokenize free text into lowercase terms.
///
/// Every character that is neither a word character (alphanumeric or `_`)
/// nor whitespace becomes a space, so punctuation strips away while term
/// boundaries survive. Tokens shorter than two characters are dropped.
///
/// No stemming and no stopword removal; inflected forms of the same word
/// index as distinct terms, which degrades recall on morphologically rich
/// languages.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}
