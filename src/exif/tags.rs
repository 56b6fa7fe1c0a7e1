//! Tag numbers, names, and the structural tag set.

use std::fmt;

/// Which directory an entry lives in.
///
/// `Exif`, `Gps` and `Interop` always refer to the sub-directories hung off
/// the first image directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IfdKind {
    Image(u16),
    Exif,
    Gps,
    Interop,
}

impl fmt::Display for IfdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IfdKind::Image(n) => write!(f, "IFD{n}"),
            IfdKind::Exif => f.write_str("Exif"),
            IfdKind::Gps => f.write_str("GPS"),
            IfdKind::Interop => f.write_str("Interop"),
        }
    }
}

/// The primary image directory.
pub const IFD0: IfdKind = IfdKind::Image(0);

// Pointers and image-data layout, synthesized by the serializer
pub const EXIF_POINTER: u16 = 0x8769;
pub const GPS_POINTER: u16 = 0x8825;
pub const INTEROP_POINTER: u16 = 0xA005;
pub const STRIP_OFFSETS: u16 = 0x0111;
pub const STRIP_BYTE_COUNTS: u16 = 0x0117;
pub const TILE_OFFSETS: u16 = 0x0144;
pub const TILE_BYTE_COUNTS: u16 = 0x0145;
pub const JPEG_OFFSET: u16 = 0x0201;
pub const JPEG_LENGTH: u16 = 0x0202;
pub const SUB_IFDS: u16 = 0x014A;

// Metadata carriers inside a TIFF file's first directory
pub const XMP_PACKET: u16 = 0x02BC;
pub const IPTC_NAA: u16 = 0x83BB;

// Editable IFD0 tags
pub const MAKE: u16 = 0x010F;
pub const IMAGE_DESCRIPTION: u16 = 0x010E;
pub const ARTIST: u16 = 0x013B;
pub const COPYRIGHT: u16 = 0x8298;
pub const XP_TITLE: u16 = 0x9C9B;
pub const XP_COMMENT: u16 = 0x9C9C;
pub const XP_AUTHOR: u16 = 0x9C9D;
pub const XP_KEYWORDS: u16 = 0x9C9E;
pub const XP_SUBJECT: u16 = 0x9C9F;

// Editable Exif IFD tags
pub const USER_COMMENT: u16 = 0x9286;

// GPS IFD
pub const GPS_VERSION_ID: u16 = 0x0000;
pub const GPS_LATITUDE_REF: u16 = 0x0001;
pub const GPS_LATITUDE: u16 = 0x0002;
pub const GPS_LONGITUDE_REF: u16 = 0x0003;
pub const GPS_LONGITUDE: u16 = 0x0004;
pub const GPS_ALTITUDE_REF: u16 = 0x0005;
pub const GPS_ALTITUDE: u16 = 0x0006;

/// Tags whose values are file offsets: sub-directory pointers and the
/// offsets/lengths of strips, tiles and thumbnails. The IFD writer
/// synthesizes all of them except SubIFDs, which make a block read-only.
pub fn is_layout_tag(tag: u16) -> bool {
    matches!(
        tag,
        EXIF_POINTER
            | GPS_POINTER
            | INTEROP_POINTER
            | STRIP_OFFSETS
            | STRIP_BYTE_COUNTS
            | TILE_OFFSETS
            | TILE_BYTE_COUNTS
            | JPEG_OFFSET
            | JPEG_LENGTH
            | SUB_IFDS
    )
}

/// Tags that describe how pixel data is laid out or rendered. They survive
/// a clear and are never shown as metadata.
pub fn is_structural(tag: u16) -> bool {
    is_layout_tag(tag)
        || matches!(
            tag,
            0x00FE // NewSubfileType
                | 0x00FF // SubfileType
                | 0x0100 // ImageWidth
                | 0x0101 // ImageLength
                | 0x0102 // BitsPerSample
                | 0x0103 // Compression
                | 0x0106 // PhotometricInterpretation
                | 0x0107 // Threshholding
                | 0x010A // FillOrder
                | 0x0115 // SamplesPerPixel
                | 0x0116 // RowsPerStrip
                | 0x011C // PlanarConfiguration
                | 0x0122 // GrayResponseUnit
                | 0x0123 // GrayResponseCurve
                | 0x0124 // T4Options
                | 0x0125 // T6Options
                | 0x013D // Predictor
                | 0x013E // WhitePoint
                | 0x013F // PrimaryChromaticities
                | 0x0140 // ColorMap
                | 0x0142 // TileWidth
                | 0x0143 // TileLength
                | 0x0152 // ExtraSamples
                | 0x0153 // SampleFormat
                | 0x0154 // SMinSampleValue
                | 0x0155 // SMaxSampleValue
                | 0x015B // JPEGTables
                | 0x0200 // JPEGProc
                | 0x0211 // YCbCrCoefficients
                | 0x0212 // YCbCrSubSampling
                | 0x0213 // YCbCrPositioning
                | 0x0214 // ReferenceBlackWhite
                | 0x8773 // InterColorProfile
        )
}

/// Tags of an image directory that are never normalized: structure plus the
/// XMP/IPTC carriers, which surface through their own namespaces.
pub fn is_hidden(kind: IfdKind, tag: u16) -> bool {
    match kind {
        IfdKind::Image(_) => is_structural(tag) || tag == XMP_PACKET || tag == IPTC_NAA,
        IfdKind::Exif => tag == INTEROP_POINTER,
        IfdKind::Gps | IfdKind::Interop => false,
    }
}

pub fn is_xp(tag: u16) -> bool {
    (XP_TITLE..=XP_SUBJECT).contains(&tag)
}

/// XP fields that hold several values separated by `;`.
pub fn is_xp_list(tag: u16) -> bool {
    matches!(tag, XP_AUTHOR | XP_KEYWORDS)
}

/// GPS tags stored as a degrees/minutes/seconds rational triple.
pub fn is_gps_dms(tag: u16) -> bool {
    matches!(tag, GPS_LATITUDE | GPS_LONGITUDE | 0x0014 | 0x0016)
}

/// Undefined-typed tags whose bytes are ASCII text.
pub fn is_textual_undefined(kind: IfdKind, tag: u16) -> bool {
    match kind {
        IfdKind::Exif => matches!(tag, 0x9000 | 0xA000 | 0xA420),
        IfdKind::Interop => tag == 0x0002,
        IfdKind::Gps => matches!(tag, 0x001B | 0x001C),
        IfdKind::Image(_) => false,
    }
}

pub fn tag_name(kind: IfdKind, tag: u16) -> Option<&'static str> {
    match kind {
        IfdKind::Image(_) => image_tag_name(tag),
        IfdKind::Exif => exif_tag_name(tag),
        IfdKind::Gps => gps_tag_name(tag),
        IfdKind::Interop => match tag {
            0x0001 => Some("InteroperabilityIndex"),
            0x0002 => Some("InteroperabilityVersion"),
            0x1000 => Some("RelatedImageFileFormat"),
            0x1001 => Some("RelatedImageWidth"),
            0x1002 => Some("RelatedImageLength"),
            _ => None,
        },
    }
}

/// Normalized field name for a tag; unknown tags become `<IFD>:0xNNNN`.
pub fn field_key(kind: IfdKind, tag: u16) -> String {
    match (kind, tag_name(kind, tag)) {
        (IfdKind::Image(0) | IfdKind::Exif | IfdKind::Gps | IfdKind::Interop, Some(name)) => {
            name.to_string()
        }
        (IfdKind::Image(_), Some(name)) => format!("{kind}:{name}"),
        (_, None) => format!("{kind}:0x{tag:04X}"),
    }
}

fn image_tag_name(tag: u16) -> Option<&'static str> {
    Some(match tag {
        0x0100 => "ImageWidth",
        0x0101 => "ImageLength",
        0x0102 => "BitsPerSample",
        0x0103 => "Compression",
        0x0106 => "PhotometricInterpretation",
        0x010D => "DocumentName",
        IMAGE_DESCRIPTION => "ImageDescription",
        0x010F => "Make",
        0x0110 => "Model",
        0x0112 => "Orientation",
        0x0115 => "SamplesPerPixel",
        0x011A => "XResolution",
        0x011B => "YResolution",
        0x011D => "PageName",
        0x0128 => "ResolutionUnit",
        0x0129 => "PageNumber",
        0x012D => "TransferFunction",
        0x0131 => "Software",
        0x0132 => "DateTime",
        ARTIST => "Artist",
        0x013C => "HostComputer",
        0x0213 => "YCbCrPositioning",
        0x4746 => "Rating",
        0x4749 => "RatingPercent",
        COPYRIGHT => "Copyright",
        0x8649 => "PhotoshopSettings",
        0xC4A5 => "PrintIM",
        XP_TITLE => "XPTitle",
        XP_COMMENT => "XPComment",
        XP_AUTHOR => "XPAuthor",
        XP_KEYWORDS => "XPKeywords",
        XP_SUBJECT => "XPSubject",
        _ => return None,
    })
}

fn exif_tag_name(tag: u16) -> Option<&'static str> {
    Some(match tag {
        0x829A => "ExposureTime",
        0x829D => "FNumber",
        0x8822 => "ExposureProgram",
        0x8824 => "SpectralSensitivity",
        0x8827 => "ISOSpeedRatings",
        0x8830 => "SensitivityType",
        0x8832 => "RecommendedExposureIndex",
        0x9000 => "ExifVersion",
        0x9003 => "DateTimeOriginal",
        0x9004 => "DateTimeDigitized",
        0x9010 => "OffsetTime",
        0x9011 => "OffsetTimeOriginal",
        0x9012 => "OffsetTimeDigitized",
        0x9101 => "ComponentsConfiguration",
        0x9102 => "CompressedBitsPerPixel",
        0x9201 => "ShutterSpeedValue",
        0x9202 => "ApertureValue",
        0x9203 => "BrightnessValue",
        0x9204 => "ExposureBiasValue",
        0x9205 => "MaxApertureValue",
        0x9206 => "SubjectDistance",
        0x9207 => "MeteringMode",
        0x9208 => "LightSource",
        0x9209 => "Flash",
        0x920A => "FocalLength",
        0x9214 => "SubjectArea",
        0x927C => "MakerNote",
        USER_COMMENT => "UserComment",
        0x9290 => "SubSecTime",
        0x9291 => "SubSecTimeOriginal",
        0x9292 => "SubSecTimeDigitized",
        0xA000 => "FlashpixVersion",
        0xA001 => "ColorSpace",
        0xA002 => "PixelXDimension",
        0xA003 => "PixelYDimension",
        0xA004 => "RelatedSoundFile",
        0xA20E => "FocalPlaneXResolution",
        0xA20F => "FocalPlaneYResolution",
        0xA210 => "FocalPlaneResolutionUnit",
        0xA215 => "ExposureIndex",
        0xA217 => "SensingMethod",
        0xA300 => "FileSource",
        0xA301 => "SceneType",
        0xA302 => "CFAPattern",
        0xA401 => "CustomRendered",
        0xA402 => "ExposureMode",
        0xA403 => "WhiteBalance",
        0xA404 => "DigitalZoomRatio",
        0xA405 => "FocalLengthIn35mmFilm",
        0xA406 => "SceneCaptureType",
        0xA407 => "GainControl",
        0xA408 => "Contrast",
        0xA409 => "Saturation",
        0xA40A => "Sharpness",
        0xA40C => "SubjectDistanceRange",
        0xA420 => "ImageUniqueID",
        0xA430 => "CameraOwnerName",
        0xA431 => "BodySerialNumber",
        0xA432 => "LensSpecification",
        0xA433 => "LensMake",
        0xA434 => "LensModel",
        0xA435 => "LensSerialNumber",
        0xA460 => "CompositeImage",
        _ => return None,
    })
}

fn gps_tag_name(tag: u16) -> Option<&'static str> {
    Some(match tag {
        GPS_VERSION_ID => "GPSVersionID",
        GPS_LATITUDE_REF => "GPSLatitudeRef",
        GPS_LATITUDE => "GPSLatitude",
        GPS_LONGITUDE_REF => "GPSLongitudeRef",
        GPS_LONGITUDE => "GPSLongitude",
        GPS_ALTITUDE_REF => "GPSAltitudeRef",
        GPS_ALTITUDE => "GPSAltitude",
        0x0007 => "GPSTimeStamp",
        0x0008 => "GPSSatellites",
        0x0009 => "GPSStatus",
        0x000A => "GPSMeasureMode",
        0x000B => "GPSDOP",
        0x000C => "GPSSpeedRef",
        0x000D => "GPSSpeed",
        0x000E => "GPSTrackRef",
        0x000F => "GPSTrack",
        0x0010 => "GPSImgDirectionRef",
        0x0011 => "GPSImgDirection",
        0x0012 => "GPSMapDatum",
        0x0013 => "GPSDestLatitudeRef",
        0x0014 => "GPSDestLatitude",
        0x0015 => "GPSDestLongitudeRef",
        0x0016 => "GPSDestLongitude",
        0x0017 => "GPSDestBearingRef",
        0x0018 => "GPSDestBearing",
        0x0019 => "GPSDestDistanceRef",
        0x001A => "GPSDestDistance",
        0x001B => "GPSProcessingMethod",
        0x001C => "GPSAreaInformation",
        0x001D => "GPSDateStamp",
        0x001E => "GPSDifferential",
        0x001F => "GPSHPositioningError",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_use_plain_names() {
        assert_eq!(field_key(IfdKind::Image(0), 0x010F), "Make");
        assert_eq!(field_key(IfdKind::Exif, 0x9003), "DateTimeOriginal");
        assert_eq!(field_key(IfdKind::Gps, GPS_LATITUDE), "GPSLatitude");
    }

    #[test]
    fn later_directories_are_prefixed() {
        assert_eq!(field_key(IfdKind::Image(1), 0x011A), "IFD1:XResolution");
    }

    #[test]
    fn unknown_tags_use_hex() {
        assert_eq!(field_key(IfdKind::Exif, 0xBEEF), "Exif:0xBEEF");
    }

    #[test]
    fn structure_is_hidden_but_description_is_not() {
        assert!(is_hidden(IfdKind::Image(0), 0x0100));
        assert!(is_hidden(IfdKind::Image(0), XMP_PACKET));
        assert!(!is_hidden(IfdKind::Image(0), IMAGE_DESCRIPTION));
        // GPS tag numbers overlap nothing structural
        assert!(!is_hidden(IfdKind::Gps, 0x0001));
    }

    #[test]
    fn xp_ranges() {
        assert!(is_xp(XP_TITLE));
        assert!(is_xp(XP_SUBJECT));
        assert!(!is_xp(COPYRIGHT));
        assert!(is_xp_list(XP_KEYWORDS));
        assert!(!is_xp_list(XP_SUBJECT));
    }
}
