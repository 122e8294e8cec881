use std::cmp::Ordering;

/// Compare two strings treating runs of ASCII digits as numbers, so `3.9` sorts before `3.10`.
pub(crate) fn natural_cmp(left: &str, right: &str) -> Ordering {
    let mut left = Chunks(left);
    let mut right = Chunks(right);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l_num), Ok(r_num)) => l_num.cmp(&r_num).then_with(|| l.len().cmp(&r.len())),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Splits a string into alternating runs of digits and non-digits.
struct Chunks<'a>(&'a str);

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.0.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .0
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.0.len());
        let (chunk, rest) = self.0.split_at(end);
        self.0 = rest;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::natural_cmp;

    #[test]
    fn sorts_numbers_numerically() {
        let mut classifiers = vec![
            "Programming Language :: Python :: 3.10",
            "Programming Language :: Python :: 3.9",
            "Programming Language :: Python :: 3 :: Only",
            "Typing :: Typed",
            "License :: OSI Approved :: MIT License",
        ];
        classifiers.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            classifiers,
            [
                "License :: OSI Approved :: MIT License",
                "Programming Language :: Python :: 3 :: Only",
                "Programming Language :: Python :: 3.9",
                "Programming Language :: Python :: 3.10",
                "Typing :: Typed",
            ]
        );
    }
}
