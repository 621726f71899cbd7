//! Collectible catalog
//!
//! Country flags a user can collect. The code is the collectible's natural key
//! and the id of its `achievements/{code}` document.

/// Collectible country
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub code: &'static str,
    pub name: &'static str,
    pub flag: &'static str,
}

/// Every collectible known to a fresh install
pub static COUNTRIES: &[Country] = &[
    Country { code: "AL", name: "Albania", flag: "🇦🇱" },
    Country { code: "AR", name: "Argentina", flag: "🇦🇷" },
    Country { code: "AT", name: "Austria", flag: "🇦🇹" },
    Country { code: "AU", name: "Australia", flag: "🇦🇺" },
    Country { code: "BE", name: "Belgium", flag: "🇧🇪" },
    Country { code: "BR", name: "Brazil", flag: "🇧🇷" },
    Country { code: "CA", name: "Canada", flag: "🇨🇦" },
    Country { code: "CH", name: "Switzerland", flag: "🇨🇭" },
    Country { code: "CL", name: "Chile", flag: "🇨🇱" },
    Country { code: "CN", name: "China", flag: "🇨🇳" },
    Country { code: "CO", name: "Colombia", flag: "🇨🇴" },
    Country { code: "CZ", name: "Czechia", flag: "🇨🇿" },
    Country { code: "DE", name: "Germany", flag: "🇩🇪" },
    Country { code: "DK", name: "Denmark", flag: "🇩🇰" },
    Country { code: "EG", name: "Egypt", flag: "🇪🇬" },
    Country { code: "ES", name: "Spain", flag: "🇪🇸" },
    Country { code: "FI", name: "Finland", flag: "🇫🇮" },
    Country { code: "FR", name: "France", flag: "🇫🇷" },
    Country { code: "GB", name: "United Kingdom", flag: "🇬🇧" },
    Country { code: "GR", name: "Greece", flag: "🇬🇷" },
    Country { code: "HU", name: "Hungary", flag: "🇭🇺" },
    Country { code: "ID", name: "Indonesia", flag: "🇮🇩" },
    Country { code: "IE", name: "Ireland", flag: "🇮🇪" },
    Country { code: "IL", name: "Israel", flag: "🇮🇱" },
    Country { code: "IN", name: "India", flag: "🇮🇳" },
    Country { code: "IR", name: "Iran", flag: "🇮🇷" },
    Country { code: "IT", name: "Italy", flag: "🇮🇹" },
    Country { code: "JP", name: "Japan", flag: "🇯🇵" },
    Country { code: "KE", name: "Kenya", flag: "🇰🇪" },
    Country { code: "KR", name: "South Korea", flag: "🇰🇷" },
    Country { code: "MA", name: "Morocco", flag: "🇲🇦" },
    Country { code: "MX", name: "Mexico", flag: "🇲🇽" },
    Country { code: "MY", name: "Malaysia", flag: "🇲🇾" },
    Country { code: "NG", name: "Nigeria", flag: "🇳🇬" },
    Country { code: "NL", name: "Netherlands", flag: "🇳🇱" },
    Country { code: "NO", name: "Norway", flag: "🇳🇴" },
    Country { code: "NZ", name: "New Zealand", flag: "🇳🇿" },
    Country { code: "PE", name: "Peru", flag: "🇵🇪" },
    Country { code: "PH", name: "Philippines", flag: "🇵🇭" },
    Country { code: "PK", name: "Pakistan", flag: "🇵🇰" },
    Country { code: "PL", name: "Poland", flag: "🇵🇱" },
    Country { code: "PT", name: "Portugal", flag: "🇵🇹" },
    Country { code: "RO", name: "Romania", flag: "🇷🇴" },
    Country { code: "RU", name: "Russia", flag: "🇷🇺" },
    Country { code: "SA", name: "Saudi Arabia", flag: "🇸🇦" },
    Country { code: "SE", name: "Sweden", flag: "🇸🇪" },
    Country { code: "SG", name: "Singapore", flag: "🇸🇬" },
    Country { code: "SK", name: "Slovakia", flag: "🇸🇰" },
    Country { code: "TH", name: "Thailand", flag: "🇹🇭" },
    Country { code: "TR", name: "Türkiye", flag: "🇹🇷" },
    Country { code: "UA", name: "Ukraine", flag: "🇺🇦" },
    Country { code: "AE", name: "United Arab Emirates", flag: "🇦🇪" },
    Country { code: "US", name: "United States", flag: "🇺🇸" },
    Country { code: "VE", name: "Venezuela", flag: "🇻🇪" },
    Country { code: "VN", name: "Vietnam", flag: "🇻🇳" },
    Country { code: "ZA", name: "South Africa", flag: "🇿🇦" },
];

impl Country {
    pub fn get(code: &str) -> Option<&'static Country> {
        COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
    }

    pub fn total_count() -> usize {
        COUNTRIES.len()
    }
}
