use pixelwar_shared::Color;

/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}

pub fn color_css(color: Color, alpha: f64) -> String {
    rgba_css(color.r, color.g, color.b, alpha)
}

/// Black or white, whichever reads better on `color`.
pub fn contrast_css(color: Color) -> &'static str {
    let luma = 0.299 * color.r as f64 + 0.587 * color.g as f64 + 0.114 * color.b as f64;
    if luma > 150.0 { "#111" } else { "#fff" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contrast_picks_the_readable_ink() {
        assert_eq!(contrast_css(Color::rgb(0, 0, 0)), "#fff");
        assert_eq!(contrast_css(Color::rgb(255, 255, 255)), "#111");
        assert_eq!(contrast_css(Color::rgb(255, 225, 25)), "#111");
        assert_eq!(contrast_css(Color::rgb(0, 0, 128)), "#fff");
    }

    #[test]
    fn css_strings_carry_alpha() {
        assert_eq!(rgba_css(12, 15, 23, 0.5), "rgba(12,15,23,0.5)");
        assert_eq!(color_css(Color::rgb(230, 25, 75), 1.0), "rgba(230,25,75,1)");
    }
}
