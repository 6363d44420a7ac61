use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

/// Tokens shorter than this are dropped.
pub const MIN_TOKEN_LEN: usize = 3;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9\s]").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "about","after","ago","all","also","and","any","are","ask",
            "back","been","boy","but",
            "call","can","come","could",
            "day","did","do","down",
            "each","eat","end","eye",
            "far","find","first","for","from",
            "get","go","good",
            "had","has","have","her","here","him","his","how",
            "if","into","its",
            "just","know",
            "land","let","like","long",
            "made","make","man","many","may","more","most","much","my",
            "new","no","not","now",
            "off","oil","old","one","only","other","our","out","over","own",
            "part","put",
            "run",
            "said","say","school","sea","see","set","she","sit","so","some","such",
            "take","tell","than","that","the","their","them","then","there","these","they","this","time","too","try","two",
            "up","use",
            "very",
            "want","was","water","way","well","were","what","when","which","who","why","will","with","would",
            "you","your"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into the full term stream: lowercase, strip everything but ASCII
/// letters/digits/whitespace, drop short tokens and stopwords. Duplicates are kept
/// so the result can feed frequency counts.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = NON_ALNUM.replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .filter(|t| t.len() >= MIN_TOKEN_LEN && !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Deduplicated view of a token stream, used for index membership.
pub fn term_set<S: AsRef<str>>(tokens: &[S]) -> BTreeSet<String> {
    tokens.iter().map(|t| t.as_ref().to_string()).collect()
}

/// Both views of one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analyzed {
    pub tokens: Vec<String>,
    pub terms: BTreeSet<String>,
}

pub fn analyze(text: &str) -> Analyzed {
    let tokens = tokenize(text);
    let terms = term_set(&tokens);
    Analyzed { tokens, terms }
}
