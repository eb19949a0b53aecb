use rand::seq::SliceRandom;
use rand::Rng;

/// Puts the answer among the distractors in a uniformly random order.
///
/// `SliceRandom::shuffle` is a Fisher-Yates shuffle, so each of the
/// permutations of the combined set is equally likely.
pub fn shuffle_options<R: Rng + ?Sized>(
    distractors: &[String],
    answer: &str,
    rng: &mut R,
) -> Vec<String> {
    let mut options = distractors
        .iter()
        .cloned()
        .chain(std::iter::once(answer.to_string()))
        .collect::<Vec<_>>();
    options.shuffle(rng);
    options
}
