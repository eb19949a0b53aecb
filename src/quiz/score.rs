#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackTier {
    Mastery,
    Good,
    KeepPracticing,
}

impl FeedbackTier {
    pub fn message(&self) -> &'static str {
        match self {
            FeedbackTier::Mastery => "太厲害了，你是注音大師！",
            FeedbackTier::Good => "做得很好！",
            FeedbackTier::KeepPracticing => "再接再厲！",
        }
    }
}

impl std::fmt::Display for FeedbackTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FeedbackTier::Mastery => "Mastery",
            FeedbackTier::Good => "Good",
            FeedbackTier::KeepPracticing => "Keep practicing",
        };
        f.write_str(name)
    }
}

// Ratios are compared in integers: score/total > 0.9 <=> 10 * score > 9 * total.

/// Maps the final ratio to a tier. A round with no questions counts as ratio 0.
pub fn score_tier(score: usize, total: usize) -> FeedbackTier {
    if total == 0 {
        return FeedbackTier::KeepPracticing;
    }
    if score * 10 > total * 9 {
        FeedbackTier::Mastery
    } else if score * 10 >= total * 7 {
        FeedbackTier::Good
    } else {
        FeedbackTier::KeepPracticing
    }
}

/// Same 0.7 threshold as `FeedbackTier::Good`.
pub fn celebrate(score: usize, total: usize) -> bool {
    total > 0 && score * 10 >= total * 7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameResult {
    pub score: usize,
    pub total: usize,
    pub tier: FeedbackTier,
    pub celebrate: bool,
}

impl GameResult {
    pub fn new(score: usize, total: usize) -> Self {
        Self {
            score,
            total,
            tier: score_tier(score, total),
            celebrate: celebrate(score, total),
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.score as f64 / self.total as f64 * 100.0
    }
}
