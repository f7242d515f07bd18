// SPDX-License-Identifier: MIT

/// Builds a `Vec<String>` argument list from heterogeneous displayable values.
#[macro_export]
macro_rules! args {
    ( $( $x:expr ),* $(,)? ) => {
        vec![ $( $x.to_string() ),* ]
    };
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    #[test]
    fn args_mixes_numbers_and_paths() {
        let dev = Path::new("/dev/ad0s1d");
        assert_eq!(crate::args!["-l", 1, dev.display()], vec!["-l", "1", "/dev/ad0s1d"]);
        let none: Vec<String> = crate::args![];
        assert!(none.is_empty());
    }
}
