/// Returns the candidate closest to `target` by edit distance, if any is
/// close enough to be a plausible typo.
pub fn find_best_match<I, S>(target: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let threshold = if target.chars().count() < 4 { 1 } else { 3 };
    let mut best: Option<(usize, String)> = None;

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let distance = levenshtein_distance(target, candidate);
        if distance > threshold {
            continue;
        }
        // ties resolve to the lexicographically smaller key so the hint is stable
        let better = match &best {
            None => true,
            Some((best_distance, best_name)) => {
                distance < *best_distance
                    || (distance == *best_distance && candidate < best_name.as_str())
            }
        };
        if better {
            best = Some((distance, candidate.to_string()));
        }
    }

    best.map(|(_, name)| name)
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s2_chars: Vec<char> = s2.chars().collect();
    let mut previous: Vec<usize> = (0..=s2_chars.len()).collect();
    let mut current = vec![0; s2_chars.len() + 1];

    for (i, char1) in s1.chars().enumerate() {
        current[0] = i + 1;
        for (j, char2) in s2_chars.iter().enumerate() {
            let cost = usize::from(char1 != *char2);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[s2_chars.len()]
}
