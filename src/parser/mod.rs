pub mod links;
pub mod names;
pub mod rows;

use scraper::ElementRef;

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text length of an element, in chars, after whitespace collapse.
pub fn text_len(el: ElementRef<'_>) -> usize {
    normalize_ws(&el.text().collect::<String>()).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_ws("  Juan \n\t Dela   Cruz "), "Juan Dela Cruz");
        assert_eq!(normalize_ws(" \n "), "");
    }

    #[test]
    fn text_len_counts_chars() {
        let html = Html::parse_fragment("<div> Ñoño  <b>Díaz</b> </div>");
        assert_eq!(text_len(html.root_element()), "Ñoño Díaz".chars().count());
    }
}
