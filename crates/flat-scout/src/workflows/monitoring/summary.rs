use super::domain::{UserFilter, COMMISSION_UNCONSTRAINED};

impl UserFilter {
    /// Multi-line description of the criteria, one line per setting.
    pub fn summary(&self) -> String {
        let cities = join(self.cities.iter().map(u32::to_string));
        let rooms = if self.rooms.is_empty() {
            "any".to_string()
        } else {
            join(self.rooms.iter().map(|rooms| match rooms {
                0 => "studio".to_string(),
                n => n.to_string(),
            }))
        };
        let renovation = if self.renovation_types.is_empty() {
            "any".to_string()
        } else {
            join(self.renovation_types.iter().map(|kind| kind.label().to_string()))
        };
        let pets = if self.pets_allowed {
            "hide listings that forbid pets"
        } else {
            "show all"
        };
        let tolerance = match self.tolerance_percent {
            0 => "disabled".to_string(),
            percent => format!("{percent}%"),
        };

        [
            format!("Cities: {cities}"),
            format!("Rooms: {rooms}"),
            format!("Price: {}", price_range(self.price_min, self.price_max)),
            format!("Area: {}", lower_bound(self.area_min)),
            format!("Kitchen: {}", lower_bound(self.kitchen_area_min)),
            format!("Renovation: {renovation}"),
            format!("Pets: {pets}"),
            format!("Commission: {}", commission_label(self.commission_max_percent)),
            format!("Tolerance: {tolerance}"),
        ]
        .join("\n")
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

fn commission_label(max_percent: u8) -> String {
    match max_percent {
        0 => "commission-free only".to_string(),
        percent if percent >= COMMISSION_UNCONSTRAINED => "any".to_string(),
        percent => format!("up to {percent}%"),
    }
}

fn price_range(min: u64, max: u64) -> String {
    match (min, max) {
        (0, 0) => "any".to_string(),
        (0, max) => format!("up to {} RUB", group_thousands(max)),
        (min, 0) => format!("from {} RUB", group_thousands(min)),
        (min, max) => format!(
            "{} - {} RUB",
            group_thousands(min),
            group_thousands(max)
        ),
    }
}

fn lower_bound(value: f64) -> String {
    if value > 0.0 {
        format!("from {value} m²")
    } else {
        "any".to_string()
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }
    grouped
}
