use std::str::FromStr;

use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameTheme {
    #[default]
    Monokai,
    Solarized,
    Dracula,
    GruvboxDark,
    Nord,
    OneDark,
    HighContrast,
}

pub struct ThemeColors {
    pub background: Color,
    pub border: Color,
    pub text: Color,
    pub accent: Color,
    pub paddle: Color,
    /// Paddle driven by this client
    pub own_paddle: Color,
    pub ball: Color,
}

const ALL_THEMES: [GameTheme; 7] = [
    GameTheme::Monokai,
    GameTheme::Solarized,
    GameTheme::Dracula,
    GameTheme::GruvboxDark,
    GameTheme::Nord,
    GameTheme::OneDark,
    GameTheme::HighContrast,
];

impl GameTheme {
    pub fn name(&self) -> &'static str {
        match self {
            GameTheme::Monokai => "Monokai",
            GameTheme::Solarized => "Solarized",
            GameTheme::Dracula => "Dracula",
            GameTheme::GruvboxDark => "Gruvbox Dark",
            GameTheme::Nord => "Nord",
            GameTheme::OneDark => "One Dark",
            GameTheme::HighContrast => "High Contrast",
        }
    }

    /// Cycle to the following theme, wrapping around.
    pub fn next(&self) -> GameTheme {
        let idx = ALL_THEMES.iter().position(|t| t == self).unwrap_or(0);
        ALL_THEMES[(idx + 1) % ALL_THEMES.len()]
    }

    pub fn colors(&self) -> ThemeColors {
        match self {
            GameTheme::Monokai => ThemeColors {
                background: Color::Reset,
                border: Color::Rgb(249, 38, 114),      // Monokai pink
                text: Color::Rgb(248, 248, 242),       // Monokai foreground
                accent: Color::Rgb(166, 226, 46),      // Monokai green
                paddle: Color::Rgb(102, 217, 239),     // Monokai cyan
                own_paddle: Color::Rgb(230, 219, 116), // Monokai yellow
                ball: Color::Rgb(255, 95, 135),        // Monokai light pink
            },
            GameTheme::Solarized => ThemeColors {
                background: Color::Reset,
                border: Color::Rgb(38, 139, 210), // Solarized blue
                text: Color::Rgb(101, 123, 131), // Solarized base00
                accent: Color::Rgb(42, 161, 152), // Solarized cyan
                paddle: Color::Rgb(133, 153, 0), // Solarized green
                own_paddle: Color::Rgb(181, 137, 0), // Solarized yellow
                ball: Color::Rgb(220, 50, 47), // Solarized red
            },
            GameTheme::Dracula => ThemeColors {
                background: Color::Reset,
                border: Color::Rgb(255, 121, 198), // Dracula pink
                text: Color::Rgb(248, 248, 242), // Dracula foreground
                accent: Color::Rgb(189, 147, 249), // Dracula purple
                paddle: Color::Rgb(80, 250, 123), // Dracula green
                own_paddle: Color::Rgb(241, 250, 140), // Dracula yellow
                ball: Color::Rgb(255, 85, 85), // Dracula red
            },
            GameTheme::GruvboxDark => ThemeColors {
                background: Color::Reset,
                border: Color::Rgb(250, 189, 47), // Gruvbox yellow
                text: Color::Rgb(235, 219, 178), // Gruvbox fg
                accent: Color::Rgb(184, 187, 38), // Gruvbox green
                paddle: Color::Rgb(131, 165, 152), // Gruvbox blue
                own_paddle: Color::Rgb(254, 128, 25), // Gruvbox orange
                ball: Color::Rgb(251, 73, 52), // Gruvbox red
            },
            GameTheme::Nord => ThemeColors {
                background: Color::Reset,
                border: Color::Rgb(136, 192, 208), // Nord frost
                text: Color::Rgb(216, 222, 233), // Nord fg
                accent: Color::Rgb(143, 188, 187), // Nord cyan
                paddle: Color::Rgb(94, 129, 172), // Nord blue
                own_paddle: Color::Rgb(235, 203, 139), // Nord yellow
                ball: Color::Rgb(191, 97, 106), // Nord red
            },
            GameTheme::OneDark => ThemeColors {
                background: Color::Reset,
                border: Color::Rgb(198, 120, 221), // One Dark purple
                text: Color::Rgb(171, 178, 191), // One Dark fg
                accent: Color::Rgb(97, 175, 239), // One Dark blue
                paddle: Color::Rgb(152, 195, 121), // One Dark green
                own_paddle: Color::Rgb(229, 192, 123), // One Dark yellow
                ball: Color::Rgb(224, 108, 117), // One Dark red
            },
            GameTheme::HighContrast => ThemeColors {
                background: Color::Black, // true black for max contrast
                border: Color::White, // white border
                text: Color::White, // bright white text
                accent: Color::Yellow, // bright yellow accent
                paddle: Color::Rgb(0, 255, 255), // bright cyan
                own_paddle: Color::Rgb(0, 255, 0), // bright green
                ball: Color::Rgb(255, 0, 0), // bright red
            },
        }
    }
}

impl FromStr for GameTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        ALL_THEMES
            .iter()
            .copied()
            .find(|theme| {
                let name: String = theme
                    .name()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                name == wanted
            })
            .ok_or_else(|| format!("unknown theme '{}'", s))
    }
}
