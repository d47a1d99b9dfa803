//! Image checksum calculation
//!
//! The checksum is the wrapping 32-bit sum of every byte after the
//! header, stored little-endian at offset 8.

use super::HEADER_SIZE;

const CHECKSUM_OFFSET: usize = 8;

/// Calculate the checksum of an encoded image
pub fn calculate_checksum(image: &[u8]) -> u32 {
    if image.len() <= HEADER_SIZE {
        return 0;
    }

    image[HEADER_SIZE..]
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
}

/// Write the checksum into an encoded image
pub fn update_checksum(image: &mut [u8]) {
    if image.len() < HEADER_SIZE {
        return;
    }

    let checksum = calculate_checksum(image);
    image[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
}

/// Read the stored checksum of an encoded image
pub fn stored_checksum(image: &[u8]) -> Option<u32> {
    let bytes = image.get(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Verify the checksum of an encoded image
pub fn verify_checksum(image: &[u8]) -> bool {
    image.len() >= HEADER_SIZE && stored_checksum(image) == Some(calculate_checksum(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        let data = vec![0u8; HEADER_SIZE];
        assert_eq!(calculate_checksum(&data), 0);
    }

    #[test]
    fn test_checksum_ignores_header() {
        let mut data = vec![0xFFu8; HEADER_SIZE];
        data.extend_from_slice(&[1, 2, 3, 250]);
        assert_eq!(calculate_checksum(&data), 256);
    }

    #[test]
    fn test_update_and_verify() {
        let mut data = vec![0u8; 64];
        data[20] = 0xAB;
        data[40] = 0xCD;

        update_checksum(&mut data);
        assert!(verify_checksum(&data));

        data[41] = 1;
        assert!(!verify_checksum(&data));
    }
}
