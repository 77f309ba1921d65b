/// Category used when no rule matches
pub const DEFAULT_CATEGORY: &str = "General & Other";

/// Ordered shelf rules: the first category with a keyword found in any subject wins
const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "Mystery & Thriller",
        &[
            "mystery",
            "detective",
            "crime",
            "thriller",
            "suspense",
            "private investigator",
            "missing persons",
            "murder",
        ],
    ),
    ("Fantasy", &["fantasy", "quests", "elder wand", "mutants"]),
    ("Science Fiction", &["science fiction", "sci-fi", "alien"]),
    ("Mythology", &["mythology"]),
    (
        "History & Historical Fiction",
        &["history", "historical", "roman", "romans", "england", "great britain", "asia"],
    ),
    (
        "Literary Fiction",
        &["literary", "english literature", "american literature", "classic", "fiction"],
    ),
    ("Romance & Relationships", &["romance", "love poetry", "mothers and daughters"]),
    ("Biography & Memoir", &["biography", "authors", "autobiography", "biographical fiction"]),
    ("Psychology & Society", &["psychology", "social", "abuse", "famil", "brothers", "society"]),
    (
        "Business & Economics",
        &["business", "economics", "leadership", "management", "corporation", "strategy"],
    ),
    (
        "Self-Help & Mindfulness",
        &["self-help", "critical thinking", "contentment", "life change", "quality of work life"],
    ),
    ("Children & Young Adult", &["children", "juvenile", "young adult", "school"]),
    ("Poetry", &["poetry", "poems"]),
    ("Religion & Spirituality", &["religion", "hindu", "jewish"]),
    ("Technology & Science", &["technology", "engineering", "science"]),
    (
        "Comics, Art & Humor",
        &["comic", "graphic", "astérix", "tintin", "art", "music", "humor", "humour", "puzzle"],
    ),
    ("Travel & Adventure", &["travel"]),
    ("Education & Language", &["language", "grammar", "translation", "education"]),
    ("Short Stories", &["short stories"]),
];

/// Map a book's subject headings onto one shelf category.
///
/// Matching is a case-insensitive substring search. Rules are tried in a fixed
/// order so a book tagged both "crime" and "fiction" lands in
/// "Mystery & Thriller".
#[must_use]
pub fn normalise_category<S: AsRef<str>>(subjects: &[S]) -> &'static str {
    let lowered: Vec<String> = subjects.iter().map(|s| s.as_ref().to_lowercase()).collect();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| {
            lowered.iter().any(|subject| keywords.iter().any(|k| subject.contains(k)))
        })
        .map_or(DEFAULT_CATEGORY, |(category, _)| *category)
}
