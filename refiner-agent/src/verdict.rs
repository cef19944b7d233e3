//! Turning the judge's free-text reply into an accept/reject decision.

/// Score at or above which a draft is final
pub const ACCEPTANCE_THRESHOLD: f32 = 0.7;

/// Literal passing markers recognised by [`AcceptancePolicy::Markers`]
pub const PASSING_MARKERS: [&str; 2] = ["Score: 0.7", "Score: 1"];

/// How a judge reply is turned into a [`Verdict`]
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptancePolicy {
    /// Read the reply's score (see [`parse_score`]) and accept when it is at
    /// least this value. A reply with no readable score is rejected.
    Threshold(f32),
    /// Accept when the reply contains any of these strings verbatim.
    Markers(Vec<String>),
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        AcceptancePolicy::Threshold(ACCEPTANCE_THRESHOLD)
    }
}

impl AcceptancePolicy {
    /// Substring matching on [`PASSING_MARKERS`]
    pub fn markers() -> Self {
        AcceptancePolicy::Markers(PASSING_MARKERS.iter().map(|m| m.to_string()).collect())
    }

    /// The cutoff the judge is told about in its instructions
    pub fn threshold(&self) -> f32 {
        match self {
            AcceptancePolicy::Threshold(t) => *t,
            AcceptancePolicy::Markers(_) => ACCEPTANCE_THRESHOLD,
        }
    }

    /// Decide on a judge reply. Rejections carry the whole reply as feedback.
    pub fn judge(&self, response: &str) -> Verdict {
        let score = parse_score(response);
        let accepted = match self {
            AcceptancePolicy::Threshold(t) => score.is_some_and(|s| s >= *t),
            AcceptancePolicy::Markers(markers) => {
                markers.iter().any(|m| response.contains(m.as_str()))
            }
        };

        if accepted {
            Verdict::accept(score)
        } else {
            Verdict::reject(response, score)
        }
    }
}

/// Outcome of one evaluation.
///
/// Feedback is present exactly when the draft was rejected; the constructors
/// are the only way to build one.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    accepted: bool,
    feedback: Option<String>,
    score: Option<f32>,
}

impl Verdict {
    pub fn accept(score: Option<f32>) -> Self {
        Self {
            accepted: true,
            feedback: None,
            score,
        }
    }

    pub fn reject(feedback: impl Into<String>, score: Option<f32>) -> Self {
        Self {
            accepted: false,
            feedback: Some(feedback.into()),
            score,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Score read from the reply, if one could be parsed
    pub fn score(&self) -> Option<f32> {
        self.score
    }

    /// `(accepted, feedback)`
    pub fn into_parts(self) -> (bool, Option<String>) {
        (self.accepted, self.feedback)
    }
}

/// Read the overall score from a judge reply, normalised to 0..=1.
///
/// A line that starts with `Score:` is the answer to the format the judge
/// was asked for and wins over labels elsewhere. Without one, the last
/// labelled score in the text is used, so sub-scores listed before a
/// closing overall score do not shadow it.
///
/// Case-insensitive, tolerates markdown emphasis around the label
/// (`**Score:** 0.8`) and scales `n/10`-style answers. Values that land
/// outside 0..=1 are skipped.
pub fn parse_score(response: &str) -> Option<f32> {
    headline_score(response).or_else(|| last_labelled_score(response))
}

fn headline_score(response: &str) -> Option<f32> {
    response.lines().find_map(|line| {
        let line = line.trim_start_matches(|c: char| {
            c == '*' || c == '_' || c == '#' || c.is_whitespace()
        });
        let label = line.get(.."score".len())?;
        if !label.eq_ignore_ascii_case("score") {
            return None;
        }
        score_after_label(&line["score".len()..])
    })
}

fn last_labelled_score(response: &str) -> Option<f32> {
    // ASCII lowering keeps byte offsets aligned with `response`.
    let lowered = response.to_ascii_lowercase();
    let mut from = 0;
    let mut last = None;

    while let Some(pos) = lowered[from..].find("score") {
        let start = from + pos + "score".len();
        from = start;
        if let Some(score) = score_after_label(&response[start..]) {
            last = Some(score);
        }
    }
    last
}

fn score_after_label(rest: &str) -> Option<f32> {
    let rest = rest.trim_start_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());
    let rest = rest.strip_prefix(':')?;
    let rest = rest.trim_start_matches(|c: char| {
        c == '*' || c == '_' || c == '`' || c.is_whitespace()
    });

    let (value, rest) = leading_number(rest)?;
    let rest = rest.trim_start_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());

    let score = match rest.strip_prefix('/') {
        Some(denominator) => {
            let (max, _) = leading_number(denominator.trim_start())?;
            if max <= 0.0 {
                return None;
            }
            value / max
        }
        None => value,
    };

    (0.0..=1.0).contains(&score).then_some(score)
}

fn leading_number(s: &str) -> Option<(f32, &str)> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    // A sentence-ending period is not part of the number.
    let digits = s[..end].trim_end_matches('.');
    let value = digits.parse::<f32>().ok()?;
    Some((value, &s[digits.len()..]))
}
