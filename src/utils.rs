use std::str::FromStr;

/// Parse `x,y,z` into a triplet
pub fn parse_triplet<T: FromStr>(s: &str) -> Result<(T, T, T), String>
where
    <T as FromStr>::Err: std::fmt::Display,
{
    let v = s.split(',').map(str::trim).collect::<Vec<_>>();
    if v.len() != 3 { return Err(format!("expected three comma-separated values, got `{s}`")) }
    let parse = |x: &str| x.parse::<T>().map_err(|e| format!("`{x}`: {e}"));
    Ok((parse(v[0])?, parse(v[1])?, parse(v[2])?))
}

/// `"no"` disables an optional angular cutoff; anything else must parse as an angle
pub fn parse_maybe_cutoff(s: &str) -> Result<Option<units::Angle>, String> {
    if s.trim() == "no" { return Ok(None) }
    s.parse().map(Some).map_err(|e| format!("`{s}`: {e}"))
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}


pub mod timing {

    use super::group_digits;
    use std::time::Instant;
    use std::io::Write;

    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            let _ = std::io::stdout().flush();
            self.start_timer();
        }

        // Print time elapsed since last start or done
        pub fn done(&mut self) {
            println!("{} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use units::deg;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[rstest(/**/ input,             expected,
             case("1,2,3",           Ok((1.0, 2.0, 3.0))),
             case(" 0, -1 ,0.5",     Ok((0.0, -1.0, 0.5))),
    )]
    fn triplets(input: &str, expected: Result<(f64, f64, f64), String>) {
        assert_eq!(parse_triplet::<f64>(input), expected);
    }

    #[test]
    fn bad_triplets() {
        assert!(parse_triplet::<f64>("1,2").is_err());
        assert!(parse_triplet::<f64>("1,x,3").is_err());
    }

    #[test]
    fn cutoffs() {
        assert_eq!(parse_maybe_cutoff("no"), Ok(None));
        assert_eq!(parse_maybe_cutoff("60 degrees"), Ok(Some(deg(60.0))));
        assert!(parse_maybe_cutoff("sixty").is_err());
    }

    #[test]
    fn digits_are_grouped() {
        assert_eq!(group_digits(1234567), "1,234,567");
        assert_eq!(group_digits(12), "12");
    }
}
