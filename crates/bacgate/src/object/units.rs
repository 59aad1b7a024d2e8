//! Engineering units

/// Atom names accepted on the control channel and their enumeration values
const UNIT_ATOMS: &[(&str, u16)] = &[
    ("square_meters", 0),
    ("square_feet", 1),
    ("milliamperes", 2),
    ("amperes", 3),
    ("ohms", 4),
    ("volts", 5),
    ("kilovolts", 6),
    ("megavolts", 7),
    ("volt_amperes", 8),
    ("kilovolt_amperes", 9),
    ("megavolt_amperes", 10),
    ("volt_amperes_reactive", 11),
    ("kilovolt_amperes_reactive", 12),
    ("megavolt_amperes_reactive", 13),
    ("degrees_phase", 14),
    ("power_factor", 15),
    ("joules", 16),
    ("kilojoules", 17),
    ("watt_hours", 18),
    ("kilowatt_hours", 19),
    ("btus", 20),
    ("therms", 21),
    ("ton_hours", 22),
    ("joules_per_kilogram_dry_air", 23),
    ("btus_per_pound_dry_air", 24),
    ("cycles_per_hour", 25),
    ("cycles_per_minute", 26),
    ("hertz", 27),
    ("grams_of_water_per_kilogram_dry_air", 28),
    ("percent_relative_humidity", 29),
    ("millimeters", 30),
    ("meters", 31),
    ("inches", 32),
    ("feet", 33),
    ("watts_per_square_foot", 34),
    ("watts_per_square_meter", 35),
    ("lumens", 36),
    ("luxes", 37),
    ("foot_candles", 38),
    ("kilograms", 39),
    ("pounds_mass", 40),
    ("tons", 41),
    ("kilograms_per_second", 42),
    ("kilograms_per_minute", 43),
    ("kilograms_per_hour", 44),
    ("pounds_mass_per_minute", 45),
    ("pounds_mass_per_hour", 46),
    ("watts", 47),
    ("kilowatts", 48),
    ("megawatts", 49),
    ("btus_per_hour", 50),
    ("horsepower", 51),
    ("tons_refrigeration", 52),
    ("pascals", 53),
    ("kilopascals", 54),
    ("bars", 55),
    ("pounds_force_per_square_inch", 56),
    ("centimeters_of_water", 57),
    ("inches_of_water", 58),
    ("millimeters_of_mercury", 59),
    ("centimeters_of_mercury", 60),
    ("inches_of_mercury", 61),
    ("degrees_celsius", 62),
    ("degrees_kelvin", 63),
    ("degrees_fahrenheit", 64),
    ("degree_days_celsius", 65),
    ("degree_days_fahrenheit", 66),
    ("years", 67),
    ("months", 68),
    ("weeks", 69),
    ("days", 70),
    ("hours", 71),
    ("minutes", 72),
    ("seconds", 73),
    ("meters_per_second", 74),
    ("kilometers_per_hour", 75),
    ("feet_per_second", 76),
    ("feet_per_minute", 77),
    ("miles_per_hour", 78),
    ("cubic_feet", 79),
    ("cubic_meters", 80),
    ("imperial_gallons", 81),
    ("liters", 82),
    ("us_gallons", 83),
    ("cubic_feet_per_minute", 84),
    ("cubic_meters_per_second", 85),
    ("imperial_gallons_per_minute", 86),
    ("liters_per_second", 87),
    ("liters_per_minute", 88),
    ("us_gallons_per_minute", 89),
    ("degrees_angular", 90),
    ("degrees_celsius_per_hour", 91),
    ("degrees_celsius_per_minute", 92),
    ("degrees_fahrenheit_per_hour", 93),
    ("degrees_fahrenheit_per_minute", 94),
    ("no_units", 95),
    ("parts_per_million", 96),
    ("parts_per_billion", 97),
    ("percent", 98),
    ("percent_per_second", 99),
    ("per_minute", 100),
    ("per_second", 101),
    ("psi_per_degree_fahrenheit", 102),
    ("radians", 103),
    ("revolutions_per_minute", 104),
];

/// BACnet engineering units enumeration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineeringUnits(u16);

impl EngineeringUnits {
    pub const PERCENT: Self = Self(98);
    pub const NO_UNITS: Self = Self(95);
    pub const DEGREES_CELSIUS: Self = Self(62);
    pub const WATTS: Self = Self(47);

    /// Look up a unit by its atom name (case-sensitive)
    pub fn from_atom(atom: &str) -> Option<Self> {
        UNIT_ATOMS
            .iter()
            .find(|(name, _)| *name == atom)
            .map(|(_, code)| Self(*code))
    }

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn name(self) -> Option<&'static str> {
        UNIT_ATOMS.iter().find(|(_, code)| *code == self.0).map(|(name, _)| *name)
    }
}

impl Default for EngineeringUnits {
    fn default() -> Self {
        Self::PERCENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_lookup() {
        assert_eq!(EngineeringUnits::from_atom("degrees_celsius"), Some(EngineeringUnits::DEGREES_CELSIUS));
        assert_eq!(EngineeringUnits::from_atom("kilowatts").map(EngineeringUnits::code), Some(48));
        assert_eq!(EngineeringUnits::from_atom("Degrees_Celsius"), None);
        assert_eq!(EngineeringUnits::from_atom("furlongs"), None);
    }

    #[test]
    fn test_unit_names() {
        assert_eq!(EngineeringUnits::PERCENT.name(), Some("percent"));
        assert_eq!(EngineeringUnits::default(), EngineeringUnits::PERCENT);
    }
}
