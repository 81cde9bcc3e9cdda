use crossterm::style::Color;

pub struct Theme {
    pub fg: Color,
    pub primary: Color,   // Blue
    pub secondary: Color, // Orange
    pub comment: Color,   // Grey
    pub success: Color,   // Green
    pub error: Color,     // Red
    pub function: Color,
    pub return_value: Color,
    pub added: Color,
    pub removed: Color,
}

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb { r, g, b }
}

pub const DEFAULT_THEME: Theme = Theme {
    fg: rgb(205, 214, 244),
    primary: rgb(137, 180, 250),
    secondary: rgb(250, 179, 135),
    comment: rgb(108, 112, 134),
    success: rgb(166, 227, 161),
    error: rgb(243, 139, 168),
    function: rgb(249, 226, 175),     // Yellow for call/return
    return_value: rgb(245, 194, 231), // Pink
    added: rgb(166, 227, 161),
    removed: rgb(180, 165, 120), // Muted yellow
};

impl Theme {
    /// Tag color for an event type
    pub fn event_color(&self, tag: &str) -> Color {
        match tag {
            "call" | "return" => self.function,
            "exception" => self.error,
            "budget_exceeded" => self.secondary,
            _ => self.primary,
        }
    }
}
