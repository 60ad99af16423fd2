use ratatui::style::Color;

#[derive(Clone)]
pub struct Theme {
    pub name: &'static str,
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub muted: Color,
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub question_color: Color,
    pub answer_color: Color,
    pub heading_color: Color,
    pub code_fg: Color,
    pub border: Color,
    /// syntect theme used for fenced code blocks.
    pub syntax_theme: &'static str,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            name: "dark",
            bg: Color::Rgb(30, 30, 30),
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(122, 162, 247),
            muted: Color::Rgb(100, 100, 100),
            success: Color::Rgb(158, 206, 106),
            error: Color::Rgb(247, 118, 142),
            warning: Color::Rgb(224, 175, 104),
            question_color: Color::Cyan,
            answer_color: Color::Rgb(220, 220, 220),
            heading_color: Color::Rgb(122, 162, 247),
            code_fg: Color::Rgb(206, 145, 120),
            border: Color::Rgb(60, 60, 60),
            syntax_theme: "base16-ocean.dark",
        }
    }

    pub fn light() -> Self {
        Self {
            name: "light",
            bg: Color::Rgb(250, 250, 250),
            fg: Color::Rgb(40, 40, 40),
            accent: Color::Rgb(0, 95, 175),
            muted: Color::Rgb(140, 140, 140),
            success: Color::Rgb(40, 130, 40),
            error: Color::Rgb(190, 30, 45),
            warning: Color::Rgb(175, 110, 0),
            question_color: Color::Rgb(0, 110, 140),
            answer_color: Color::Rgb(40, 40, 40),
            heading_color: Color::Rgb(0, 95, 175),
            code_fg: Color::Rgb(160, 60, 20),
            border: Color::Rgb(200, 200, 200),
            syntax_theme: "InspiredGitHub",
        }
    }

    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night",
            bg: Color::Rgb(26, 27, 38),
            fg: Color::Rgb(169, 177, 214),
            accent: Color::Rgb(122, 162, 247),
            muted: Color::Rgb(86, 95, 137),
            success: Color::Rgb(158, 206, 106),
            error: Color::Rgb(247, 118, 142),
            warning: Color::Rgb(224, 175, 104),
            question_color: Color::Rgb(125, 207, 255),
            answer_color: Color::Rgb(169, 177, 214),
            heading_color: Color::Rgb(187, 154, 247),
            code_fg: Color::Rgb(255, 158, 100),
            border: Color::Rgb(52, 53, 74),
            syntax_theme: "base16-eighties.dark",
        }
    }

    pub fn by_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "tokyo-night" => Self::tokyo_night(),
            _ => Self::dark(),
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        screener_core::constants::defaults::THEMES
    }
}
