use custom_error::custom_error;

pub type Result<T> = std::result::Result<T, Error>;

custom_error! {pub Error
    Io{source: std::io::Error} = "I/O error",
    Zip{source: zip::result::ZipError} = "zip archive error",
    Document{message: String} = "document could not be parsed: {message}",
    Record{entity: String, message: String} = "malformed {entity} record: {message}",
    UnresolvedReference{entity: String, key: String} = "{entity} references unknown parent {key}",
    UnknownStructure{tag: String} = "unknown structure <{tag}>",
    CoordinateFormat{input: String} = "unrecognized DMS coordinate '{input}'",
    Table{source: serde_json::Error} = "invalid reference table: {source}"
}

impl Error {
    pub fn document<M: Into<String>>(message: M) -> Error {
        Error::Document {
            message: message.into(),
        }
    }

    pub fn record<E: Into<String>, M: Into<String>>(entity: E, message: M) -> Error {
        Error::Record {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Error {
        Error::document(e.to_string())
    }
}
